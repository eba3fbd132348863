//! # Hub configuration
//!
//! [`HubConf`] carries every tunable of a running hub. The `groundhub` binary fills it from
//! command line flags, library users can start from [`HubConf::default`] and override values
//! with builder-style setters.

use std::time::Duration;

use crate::bus::TopicConf;
use crate::consts::{
    DEFAULT_DECODE_ERROR_THRESHOLD, DEFAULT_OBSTACLE_POLL_RATE, DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_REPORT_PERIOD, DEFAULT_STATUS_PERIOD, MISSION_PROTOCOL_RETRIES,
    MISSION_PROTOCOL_TIMEOUT,
};

/// Hub tunables.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HubConf {
    /// Topic inbox and subscriber queue capacities.
    pub topic: TopicConf,
    /// Fixed interval between MAVLink reconnection attempts.
    pub reconnect_interval: Duration,
    /// Consecutive invalid frames tolerated before links are rebuilt.
    pub decode_error_threshold: usize,
    /// Mission protocol answer timeout.
    pub mission_timeout: Duration,
    /// Mission protocol retransmissions.
    pub mission_retries: usize,
    /// Mission status snapshot period.
    pub report_period: Duration,
    /// Obstacle polling rate, requests per second.
    pub poll_rate: f64,
    /// Hub status broadcast period.
    pub status_period: Duration,
}

impl Default for HubConf {
    fn default() -> Self {
        Self {
            topic: TopicConf::default(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            decode_error_threshold: DEFAULT_DECODE_ERROR_THRESHOLD,
            mission_timeout: MISSION_PROTOCOL_TIMEOUT,
            mission_retries: MISSION_PROTOCOL_RETRIES,
            report_period: DEFAULT_REPORT_PERIOD,
            poll_rate: DEFAULT_OBSTACLE_POLL_RATE,
            status_period: DEFAULT_STATUS_PERIOD,
        }
    }
}

impl HubConf {
    /// Sets topic configuration.
    pub fn topic(mut self, topic: TopicConf) -> Self {
        self.topic = topic;
        self
    }

    /// Sets MAVLink reconnection interval.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets invalid frame threshold.
    pub fn decode_error_threshold(mut self, threshold: usize) -> Self {
        self.decode_error_threshold = threshold;
        self
    }

    /// Sets mission protocol timeout and retransmissions.
    pub fn mission_protocol(mut self, timeout: Duration, retries: usize) -> Self {
        self.mission_timeout = timeout;
        self.mission_retries = retries;
        self
    }

    /// Sets mission status snapshot period.
    pub fn report_period(mut self, period: Duration) -> Self {
        self.report_period = period;
        self
    }

    /// Sets obstacle polling rate.
    pub fn poll_rate(mut self, rate: f64) -> Self {
        self.poll_rate = rate;
        self
    }

    /// Sets hub status broadcast period.
    pub fn status_period(mut self, period: Duration) -> Self {
        self.status_period = period;
        self
    }
}
