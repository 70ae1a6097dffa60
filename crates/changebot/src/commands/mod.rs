//! Command implementations

pub mod run;

pub mod status;

/// Render `message` as a GitHub Actions `::error::` workflow command.
///
/// `%`, `\r`, and `\n` are escaped so multi-line messages stay one annotation.
pub fn error_annotation(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{escaped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_escapes_newlines_and_percent() {
        assert_eq!(
            error_annotation("100% broken\nsee log"),
            "::error::100%25 broken%0Asee log"
        );
    }
}
