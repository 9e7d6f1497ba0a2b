use tracing::{info, warn};

use crate::browser::driver::{BrowserDriver, NavigateOptions};
use crate::error::{CaptureError, Result};
use crate::locator::locator_model::{ComponentLocator, ComponentRole};

/// External recovery from `AuthExpired`. Tried at most once per page run.
pub trait Reauthenticate: Send + Sync {
    fn reauthenticate(&self, driver: &mut dyn BrowserDriver) -> Result<()>;
}

/// Detects a session that was bounced to the login page.
#[derive(Debug, Clone)]
pub struct AuthRedirect {
    pub pattern: String,
}

impl AuthRedirect {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }

    pub fn is_login_page(&self, url: &str) -> bool {
        !self.pattern.is_empty() && url.contains(&self.pattern)
    }

    /// True when `current` is the login page and `target` is not.
    pub fn is_redirected(&self, target: &str, current: &str) -> bool {
        self.is_login_page(current) && !self.is_login_page(target)
    }
}

/// Username/password login through the application's own form.
#[derive(Debug, Clone)]
pub struct FormLogin {
    pub login_url: String,
    pub username: String,
    pub password: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    pub redirect: AuthRedirect,
    pub settle_ms: u64,
}

impl FormLogin {
    fn field(selector: &str, label: &str) -> ComponentLocator {
        ComponentLocator {
            selector: selector.to_string(),
            role: ComponentRole::Form,
            section: "main".to_string(),
            label: label.to_string(),
        }
    }
}

impl Reauthenticate for FormLogin {
    fn reauthenticate(&self, driver: &mut dyn BrowserDriver) -> Result<()> {
        info!(url = %self.login_url, "re-authenticating");

        driver.navigate(&self.login_url, &NavigateOptions::default())?;
        driver.fill(&Self::field(&self.username_selector, "username"), &self.username)?;
        driver.fill(&Self::field(&self.password_selector, "password"), &self.password)?;

        let submit = ComponentLocator {
            role: ComponentRole::Button,
            ..Self::field(&self.submit_selector, "submit")
        };
        driver.click(&submit)?;
        driver.wait_for(self.settle_ms)?;

        let landed = driver.current_url()?;
        if self.redirect.is_login_page(&landed) {
            warn!(%landed, "still on the login page after submitting credentials");
            return Err(CaptureError::AuthExpired("re-authentication failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_detection_ignores_login_targets() {
        let redirect = AuthRedirect::new("/login");
        assert!(redirect.is_redirected("https://app.test/settings", "https://app.test/login?next=/settings"));
        assert!(!redirect.is_redirected("https://app.test/login", "https://app.test/login"));
        assert!(!redirect.is_redirected("https://app.test/settings", "https://app.test/settings"));
    }
}
