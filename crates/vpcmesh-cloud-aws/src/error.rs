//! SDK error translation

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use vpcmesh_cloud::CloudError;

/// Convert an SDK failure into a [`CloudError::Api`], keeping the service
/// error code so callers can classify not-found and dependency errors.
pub fn sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    CloudError::api(operation, code, message)
}

/// Field the service promised but left out of a response
pub fn missing(operation: &'static str, field: &str) -> CloudError {
    CloudError::unexpected(operation, format!("response is missing {field}"))
}
