// Navigation to the destination chosen by the mood service

use crate::error::{MoodDetectorError, Result};
use crate::models::NavigationDirective;
use reqwest::Url;
use std::io::Write;
use tracing::info;

/// Performs a full-page navigation
pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &Url) -> Result<()>;
}

/// Resolves a directive against the server base URL.
///
/// Absolute targets are used as-is; relative ones such as
/// `/player?mood=happy` land on the server origin.
pub fn resolve_directive(base: &Url, directive: &NavigationDirective) -> Result<Url> {
    base.join(directive.target()).map_err(|e| {
        MoodDetectorError::Navigation(format!("invalid redirect {:?}: {e}", directive.target()))
    })
}

/// Prints the destination on stdout for a launcher or shell to open
pub struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn navigate(&self, location: &Url) -> Result<()> {
        info!("Navigating to {}", location);
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{location}")?;
        stdout.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:5000/dashboard").unwrap()
    }

    #[test]
    fn relative_redirect_lands_on_server_origin() {
        let url = resolve_directive(
            &base(),
            &NavigationDirective("/player?mood=happy".to_string()),
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/player?mood=happy");
    }

    #[test]
    fn absolute_redirect_is_kept() {
        let url = resolve_directive(
            &base(),
            &NavigationDirective("https://open.spotify.com/playlist/abc".to_string()),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://open.spotify.com/playlist/abc");
    }

    #[test]
    fn unparseable_redirect_is_a_navigation_error() {
        let err = resolve_directive(&base(), &NavigationDirective("http://[::1".to_string()))
            .unwrap_err();
        assert!(matches!(err, MoodDetectorError::Navigation(_)));
    }
}
