use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Delivery channel for one-time codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    pub const BOTH: [Channel; 2] = [Channel::Email, Channel::Phone];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent resend timers per channel. A timer only restarts on its own
/// successful send.
#[derive(Debug, Clone)]
pub struct ResendCooldowns {
    duration: Duration,
    started: HashMap<Channel, DateTime<Utc>>,
}

impl ResendCooldowns {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: HashMap::new(),
        }
    }

    pub fn start(&mut self, channel: Channel, now: DateTime<Utc>) {
        self.started.insert(channel, now);
    }

    /// Time left before `channel` may resend, if any.
    pub fn remaining(&self, channel: Channel, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started.get(&channel)?;
        let left = *started + self.duration - now;
        (left > Duration::zero()).then_some(left)
    }

    pub fn is_ready(&self, channel: Channel, now: DateTime<Utc>) -> bool {
        self.remaining(channel, now).is_none()
    }

    pub fn clear(&mut self) {
        self.started.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn channels_are_independent() {
        let mut cooldowns = ResendCooldowns::new(Duration::seconds(30));
        assert!(cooldowns.is_ready(Channel::Email, at(0)));

        cooldowns.start(Channel::Email, at(0));
        assert!(!cooldowns.is_ready(Channel::Email, at(10)));
        assert!(cooldowns.is_ready(Channel::Phone, at(10)));
        assert_eq!(
            cooldowns.remaining(Channel::Email, at(10)),
            Some(Duration::seconds(20))
        );
    }

    #[test]
    fn cooldown_elapses_exactly_at_duration() {
        let mut cooldowns = ResendCooldowns::new(Duration::seconds(30));
        cooldowns.start(Channel::Phone, at(0));
        assert!(!cooldowns.is_ready(Channel::Phone, at(29)));
        assert!(cooldowns.is_ready(Channel::Phone, at(30)));
    }

    #[test]
    fn restart_and_clear() {
        let mut cooldowns = ResendCooldowns::new(Duration::seconds(30));
        cooldowns.start(Channel::Email, at(0));
        cooldowns.start(Channel::Email, at(25));
        assert!(!cooldowns.is_ready(Channel::Email, at(40)));
        cooldowns.clear();
        assert!(cooldowns.is_ready(Channel::Email, at(40)));
    }
}
