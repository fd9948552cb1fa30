//! Canonical structured event names used across `lwm2m-server-core`.

// Registration lifecycle events.
pub const REGISTRATION_ADD_OK: &str = "registration_add_ok";
pub const REGISTRATION_REPLACED: &str = "registration_replaced";
pub const REGISTRATION_UPDATE_OK: &str = "registration_update_ok";
pub const REGISTRATION_UPDATE_UNKNOWN: &str = "registration_update_unknown";
pub const REGISTRATION_REMOVE_OK: &str = "registration_remove_ok";
pub const REGISTRATION_REMOVE_UNKNOWN: &str = "registration_remove_unknown";
pub const REGISTRATION_EXPIRED: &str = "registration_expired";
pub const REGISTRATION_CLEANUP_DONE: &str = "registration_cleanup_done";
pub const REGISTRATION_STORE_FAILED: &str = "registration_store_failed";

// Registration interface (inbound `/rd`) events.
pub const RD_REQUEST_RECEIVED: &str = "rd_request_received";
pub const RD_REQUEST_REJECTED: &str = "rd_request_rejected";

// Downlink request events.
pub const REQUEST_SEND_ATTEMPT: &str = "request_send_attempt";
pub const REQUEST_SEND_FAILED: &str = "request_send_failed";
pub const REQUEST_REFUSED_SLEEPING: &str = "request_refused_sleeping";
pub const REQUEST_REFUSED_UNKNOWN_REGISTRATION: &str = "request_refused_unknown_registration";
pub const REQUEST_RESPONSE_OK: &str = "request_response_ok";
pub const REQUEST_RESPONSE_UNEXPECTED: &str = "request_response_unexpected";
pub const REQUEST_TIMED_OUT: &str = "request_timed_out";
pub const REQUEST_CANCELLED: &str = "request_cancelled";
pub const REQUEST_LATE_EVENT_DISCARDED: &str = "request_late_event_discarded";
pub const PENDING_REQUESTS_CANCELLED: &str = "pending_requests_cancelled";

// Observation events.
pub const OBSERVATION_ADDED: &str = "observation_added";
pub const OBSERVATION_REPLACED: &str = "observation_replaced";
pub const OBSERVATION_REJECTED_UNKNOWN_REGISTRATION: &str = "observation_rejected_unknown_registration";
pub const OBSERVATION_CANCELLED: &str = "observation_cancelled";
pub const OBSERVATION_DEVICE_CANCEL_FAILED: &str = "observation_device_cancel_failed";
pub const NOTIFICATION_RECEIVED: &str = "notification_received";
pub const NOTIFICATION_DROPPED_UNKNOWN_TOKEN: &str = "notification_dropped_unknown_token";
pub const NOTIFICATION_DROPPED_STALE: &str = "notification_dropped_stale";
pub const NOTIFICATION_DECODE_FAILED: &str = "notification_decode_failed";

// Presence events.
pub const PRESENCE_TRACKED: &str = "presence_tracked";
pub const PRESENCE_AWAKE: &str = "presence_awake";
pub const PRESENCE_SLEEPING: &str = "presence_sleeping";
pub const PRESENCE_UNTRACKED: &str = "presence_untracked";

// Runtime events.
pub const EXPIRATION_SWEEP_START: &str = "expiration_sweep_start";
pub const EXPIRATION_SWEEP_OK: &str = "expiration_sweep_ok";
pub const EXPIRATION_SWEEP_FAILED: &str = "expiration_sweep_failed";
pub const EXPIRATION_TASK_STOPPED: &str = "expiration_task_stopped";
pub const SERVER_STARTED: &str = "server_started";
pub const SERVER_STOPPED: &str = "server_stopped";
