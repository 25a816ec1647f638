/// Outbound mail is an external collaborator; the engine only needs a seam
/// to hand a login code to. Delivery mechanics (SMTP, providers) live behind
/// this trait.
pub trait Mailer: Send + Sync {
    fn send_login_code(&self, email: &str, code: &str);
}

/// Default mailer: logs the code instead of sending it. Suitable for
/// development and tests; production deployments plug in a real sender.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_login_code(&self, email: &str, code: &str) {
        tracing::info!("login code for {}: {}", email, code);
    }
}

#[cfg(test)]
pub mod testing {
    use super::Mailer;
    use std::sync::Mutex;

    /// Captures sent codes for assertions.
    #[derive(Default)]
    pub struct CaptureMailer {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl Mailer for CaptureMailer {
        fn send_login_code(&self, email: &str, code: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string()));
        }
    }
}
