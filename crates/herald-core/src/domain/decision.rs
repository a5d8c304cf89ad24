//! Decision model: what to do after a failed attempt.
//!
//! Pure function of the attempt count returned by the claim and the configured
//! budget. The poller executes the decision (mark_retry / mark_failed + emit).

/// The next action for an event whose current attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the event pending; the next poll cycle claims it again.
    Retry { attempts: u32, max_retries: u32 },

    /// Budget exhausted: mark failed and emit the compensating event.
    GiveUp { attempts: u32, max_retries: u32 },
}

/// Retry budget.
///
/// The check runs against the attempt count *after* the claim incremented it:
/// `attempts >= max_retries` gives up. With `max_retries = R` an event that
/// always fails is claimed exactly R times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_retries: u32,
}

impl RetryBudget {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn decide(&self, attempts: u32) -> Decision {
        if attempts >= self.max_retries {
            Decision::GiveUp {
                attempts,
                max_retries: self.max_retries,
            }
        } else {
            Decision::Retry {
                attempts,
                max_retries: self.max_retries,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::first_of_three(1, 3, false)]
    #[case::second_of_three(2, 3, false)]
    #[case::last_of_three(3, 3, true)]
    #[case::over_budget(4, 3, true)]
    #[case::single_shot(1, 1, true)]
    fn gives_up_once_post_increment_attempts_reach_budget(
        #[case] attempts: u32,
        #[case] max_retries: u32,
        #[case] give_up: bool,
    ) {
        let decision = RetryBudget::new(max_retries).decide(attempts);
        assert_eq!(matches!(decision, Decision::GiveUp { .. }), give_up);
    }
}
