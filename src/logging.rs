// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message
/// patterns across the API surface.

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, course_id = $course_id:expr) => {
        tracing::debug!(
            operation = $operation,
            course_id = %$course_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, course_id = $course_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            course_id = %$course_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(operation = $operation, "API operation completed: {}", $msg);
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, course_id = $course_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            course_id = %$course_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(operation = $operation, "API operation warning: {}", $msg);
    };
}

/// Log notable system lifecycle events (startup, config load, shutdown)
#[macro_export]
macro_rules! log_system_event {
    (config, $msg:expr) => {
        tracing::info!(component = "config", "System event: {}", $msg);
    };
    (startup, $msg:expr) => {
        tracing::info!(component = "startup", "System event: {}", $msg);
    };
}

/// Log validation outcomes with a consistent shape
#[macro_export]
macro_rules! log_validation {
    (success, $subject:expr, $msg:expr) => {
        tracing::debug!(subject = $subject, "Validation passed: {}", $msg);
    };
    (failure, $subject:expr, $msg:expr) => {
        tracing::warn!(subject = $subject, "Validation failed: {}", $msg);
    };
}
