use crate::auth::SessionProvider;
use crate::errors::Result;
use crate::transport::{Connector, Transport};
use crate::REQUEST_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagVerdict {
    Incorrect,
    Correct,
    /// The response matched neither wording
    Unrecognized,
}

impl FlagVerdict {
    /// Classifies the flag endpoint's free-text reply, case-insensitively.
    ///
    /// "wrong" is checked first and wins whenever it appears, including in a
    /// reply that also says "correct". Note that "incorrect" itself contains
    /// "correct".
    pub fn classify(body: &str) -> Self {
        let body = body.to_lowercase();
        if body.contains("wrong") {
            FlagVerdict::Incorrect
        } else if body.contains("correct") {
            FlagVerdict::Correct
        } else {
            FlagVerdict::Unrecognized
        }
    }
}

#[tracing::instrument(skip(provider, flag))]
pub async fn submit_flag<C: Connector>(
    provider: &SessionProvider<'_, C>,
    flag: &str,
    vm: &str,
) -> Result<FlagVerdict> {
    let authenticated = provider.authenticated_client().await?;
    let body = authenticated
        .client
        .post_form(
            &provider.endpoints.flag_url()?,
            &[("flag", flag), ("vm", vm)],
            REQUEST_TIMEOUT,
        )
        .await?;
    let verdict = FlagVerdict::classify(&body);
    tracing::debug!("Flag response for {} classified as {:?}", vm, verdict);
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_takes_precedence() {
        assert_eq!(FlagVerdict::classify("Flag is WRONG"), FlagVerdict::Incorrect);
        assert_eq!(
            FlagVerdict::classify("wrong... the correct flag looks different"),
            FlagVerdict::Incorrect
        );
    }

    #[test]
    fn correct_and_unrecognized() {
        assert_eq!(FlagVerdict::classify("Correct flag!"), FlagVerdict::Correct);
        assert_eq!(FlagVerdict::classify("That is incorrect"), FlagVerdict::Correct);
        assert_eq!(FlagVerdict::classify(""), FlagVerdict::Unrecognized);
        assert_eq!(
            FlagVerdict::classify("<html>maintenance</html>"),
            FlagVerdict::Unrecognized
        );
    }
}
