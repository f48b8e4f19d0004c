// Circuit breaker for trade episodes. Pure state, no IO; the scheduler
// feeds it each trade outcome and acts on the decision.

use crate::models::TradeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Keep trading this episode.
    Continue,
    /// Loss streak hit the limit; sit out the rest of the cycle.
    Suspend,
    /// Unrecoverable trade error; abandon the episode immediately.
    EndEpisode,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_losses: u32,
    max_consecutive_losses: u32,
}

impl CircuitBreaker {
    pub fn new(max_consecutive_losses: u32) -> Self {
        Self {
            consecutive_losses: 0,
            max_consecutive_losses,
        }
    }

    /// Fold one trade outcome into the streak counter.
    ///
    /// Take-profit resets the streak. Stop-loss extends it, suspending once
    /// the limit is reached. A trade error ends the episode without touching
    /// the counter.
    pub fn apply(&mut self, outcome: &TradeOutcome) -> BreakerDecision {
        match outcome {
            TradeOutcome::TakeProfit { .. } => {
                self.consecutive_losses = 0;
                BreakerDecision::Continue
            }
            TradeOutcome::StopLoss { .. } => {
                self.consecutive_losses += 1;
                if self.consecutive_losses >= self.max_consecutive_losses {
                    tracing::warn!(
                        losses = self.consecutive_losses,
                        "Circuit breaker tripped, suspending episode"
                    );
                    BreakerDecision::Suspend
                } else {
                    BreakerDecision::Continue
                }
            }
            TradeOutcome::Error => BreakerDecision::EndEpisode,
        }
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }
}
