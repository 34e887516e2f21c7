//! Transmission parameters and exponential back-off for confirmable
//! messages (RFC 7252 section 4.8).

use rand::Rng;
use std::time::Duration;

use crate::config::schema::CoapConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionParameters {
    pub ack_timeout: Duration,
    pub ack_random_factor: f64,
    pub max_retransmit: u32,
    /// Bound on the wait for a separate or non-confirmable response.
    pub response_timeout: Duration,
}

impl Default for TransmissionParameters {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            ack_random_factor: 1.5,
            max_retransmit: 4,
            response_timeout: Duration::from_secs(60),
        }
    }
}

impl TransmissionParameters {
    pub fn from_config(config: &CoapConfig) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            ack_random_factor: config.ack_random_factor.max(1.0),
            max_retransmit: config.max_retransmit,
            response_timeout: Duration::from_secs(config.response_timeout_secs),
        }
    }

    /// Timeout before the first retransmission, drawn from
    /// `[ACK_TIMEOUT, ACK_TIMEOUT * ACK_RANDOM_FACTOR]`.
    pub fn initial_timeout(&self) -> Duration {
        let base = self.ack_timeout.as_secs_f64();
        let upper = base * self.ack_random_factor;
        if upper <= base {
            return self.ack_timeout;
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(base..=upper))
    }

    /// Timeout after the given retransmission, doubling each time.
    pub fn backoff(initial: Duration, retransmission: u32) -> Duration {
        initial.saturating_mul(2u32.saturating_pow(retransmission))
    }

    /// Time from the first to the last transmission of a confirmable message.
    pub fn max_transmit_span(&self) -> Duration {
        self.scaled_ack_timeout(2u32.saturating_pow(self.max_retransmit) - 1)
    }

    /// Time from the first transmission until the sender gives up waiting
    /// for an acknowledgement.
    pub fn max_transmit_wait(&self) -> Duration {
        self.scaled_ack_timeout(2u32.saturating_pow(self.max_retransmit.saturating_add(1)) - 1)
    }

    /// Longest a request can stay open before the transport itself
    /// completes it: unacknowledged for the whole transmit wait, then
    /// acknowledged just in time with a separate response still owed.
    pub fn exchange_budget(&self) -> Duration {
        self.max_transmit_wait().saturating_add(self.response_timeout)
    }

    fn scaled_ack_timeout(&self, multiple: u32) -> Duration {
        let span = self.ack_timeout.as_secs_f64() * f64::from(multiple) * self.ack_random_factor;
        Duration::try_from_secs_f64(span).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_timeout_range() {
        let parameters = TransmissionParameters::default();
        for _ in 0..100 {
            let timeout = parameters.initial_timeout();
            assert!(timeout >= Duration::from_secs(2));
            assert!(timeout <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_factor_one_is_deterministic() {
        let parameters = TransmissionParameters {
            ack_random_factor: 1.0,
            ..Default::default()
        };
        assert_eq!(parameters.initial_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_doubles() {
        let initial = Duration::from_millis(100);
        assert_eq!(TransmissionParameters::backoff(initial, 0), Duration::from_millis(100));
        assert_eq!(TransmissionParameters::backoff(initial, 1), Duration::from_millis(200));
        assert_eq!(TransmissionParameters::backoff(initial, 3), Duration::from_millis(800));
    }

    #[test]
    fn test_max_transmit_span() {
        assert_eq!(
            TransmissionParameters::default().max_transmit_span(),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn test_exchange_budget() {
        let parameters = TransmissionParameters::default();
        assert_eq!(parameters.max_transmit_wait(), Duration::from_secs(93));
        assert_eq!(parameters.exchange_budget(), Duration::from_secs(153));

        let parameters = TransmissionParameters {
            ack_timeout: Duration::from_millis(100),
            ack_random_factor: 1.0,
            max_retransmit: 2,
            response_timeout: Duration::from_secs(1),
        };
        assert_eq!(parameters.max_transmit_wait(), Duration::from_millis(700));
        assert_eq!(parameters.exchange_budget(), Duration::from_millis(1700));
    }
}
