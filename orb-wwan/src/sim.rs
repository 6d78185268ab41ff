use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    InvalidPin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinResetOutcome {
    Reset,
    InvalidPuk,
}

/// Subscriber data for the inserted SIM.
///
/// The PIN can only change through [`SimCredentials::reset_pin`], which
/// refuses to touch it unless the PUK matches.
pub struct SimCredentials {
    phone_number: String,
    pin: SecretString,
    puk: SecretString,
    apn: String,
}

impl SimCredentials {
    pub fn new(
        phone_number: impl Into<String>,
        pin: SecretString,
        puk: SecretString,
        apn: impl Into<String>,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            pin,
            puk,
            apn: apn.into(),
        }
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn apn(&self) -> &str {
        &self.apn
    }

    pub fn pin(&self) -> &SecretString {
        &self.pin
    }

    pub fn puk(&self) -> &SecretString {
        &self.puk
    }

    pub fn unlock(&self, pin: &str) -> UnlockOutcome {
        if self.pin.expose_secret() == pin {
            UnlockOutcome::Unlocked
        } else {
            UnlockOutcome::InvalidPin
        }
    }

    pub fn reset_pin(&mut self, puk: &str, new_pin: SecretString) -> PinResetOutcome {
        if self.puk.expose_secret() != puk {
            warn!("invalid PUK, PIN left unchanged");
            return PinResetOutcome::InvalidPuk;
        }

        self.pin = new_pin;
        info!("SIM PIN reset");

        PinResetOutcome::Reset
    }
}

fn mask(secret: &SecretString) -> String {
    "*".repeat(secret.expose_secret().chars().count())
}

impl fmt::Display for SimCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SimCredentials(phone_number={}, pin={}, puk={}, apn={})",
            self.phone_number,
            mask(&self.pin),
            mask(&self.puk),
            self.apn
        )
    }
}

impl fmt::Debug for SimCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sim(pin: &str, puk: &str) -> SimCredentials {
        SimCredentials::new(
            "+491600000000",
            SecretString::new(pin.into()),
            SecretString::new(puk.into()),
            "internet",
        )
    }

    #[test]
    fn it_unlocks_with_the_right_pin() {
        let sim = sim("1234", "12345678");

        assert_eq!(sim.unlock("1234"), UnlockOutcome::Unlocked);
        assert_eq!(sim.unlock("4321"), UnlockOutcome::InvalidPin);
    }

    #[test]
    fn it_resets_pin_with_correct_puk() {
        let mut sim = sim("1234", "12345678");

        let outcome = sim.reset_pin("12345678", SecretString::new("9999".into()));

        assert_eq!(outcome, PinResetOutcome::Reset);
        assert_eq!(sim.pin().expose_secret(), "9999");
        assert_eq!(sim.unlock("9999"), UnlockOutcome::Unlocked);
    }

    #[test]
    fn it_masks_secrets_when_displayed() {
        let sim = sim("1234", "12345678");

        let shown = format!("{sim} {sim:?}");

        assert!(shown.contains("pin=****,"));
        assert!(shown.contains("puk=********,"));
        assert!(!shown.contains("1234"));
    }

    proptest! {
        #[test]
        fn wrong_puk_never_changes_pin(
            pin in "[0-9]{4,8}",
            puk in "[0-9]{8}",
            attempt in "[0-9]{0,10}",
            new_pin in "[0-9]{4,8}",
        ) {
            prop_assume!(attempt != puk);
            let mut sim = sim(&pin, &puk);

            let outcome = sim.reset_pin(&attempt, SecretString::new(new_pin));

            prop_assert_eq!(outcome, PinResetOutcome::InvalidPuk);
            prop_assert_eq!(sim.pin().expose_secret().as_str(), pin.as_str());
        }
    }
}
