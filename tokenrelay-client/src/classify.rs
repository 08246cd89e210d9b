//! Unauthorized-Response Classifier.

use tokenrelay_core::ExemptionSet;

use crate::error::HttpError;
use crate::request::ApiRequest;

/// Outcome of classifying a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Hand the error back to the caller unchanged.
    Propagate,
    /// Renew credentials and replay the request once.
    Renew,
}

/// Decide whether a failure is eligible for credential renewal.
///
/// Renewal is attempted only for a 401 that is attributable to a request,
/// on a non-exempt endpoint, which has not been replayed yet.
pub fn classify(
    error: &HttpError,
    request: Option<&ApiRequest>,
    exemptions: &ExemptionSet,
) -> Classification {
    let Some(request) = request else {
        return Classification::Propagate;
    };
    if !error.is_unauthorized() || request.is_retry() || exemptions.is_exempt(&request.path) {
        return Classification::Propagate;
    }
    Classification::Renew
}
