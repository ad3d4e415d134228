//! Frame pacing: when to tell each client it may draw its next frame.
//!
//! | Module      | Purpose                                               |
//! |-------------|-------------------------------------------------------|
//! | `scheduler` | Shared tick loop and pending-frame queue              |
//! | `feedback`  | Per-client cost tracking, parking and event emission  |
//! | `pacer`     | Client-to-controller table                            |
//! | `telemetry` | Client telemetry message decoding                     |
//! | `wire`      | Bit-exact done / delete-id / release records          |

pub mod feedback;
pub mod pacer;
pub mod scheduler;
pub mod telemetry;
pub mod wire;

pub use feedback::FrameFeedback;
pub use pacer::FramePacer;
pub use scheduler::{FrameCallback, FrameScheduler, MIN_TICK, PacingConfig, PendingFrame};
pub use telemetry::Telemetry;
pub use wire::{EventCodec, WireEvent, buffer_release_record, frame_done_records};
