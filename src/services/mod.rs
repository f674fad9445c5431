// Services module - business logic layer

pub mod notify;
pub mod registry;

// Ad insertion and rotation
pub mod ad_plan;
pub mod carousel;
pub mod media_probe;
pub mod sequencer;
pub mod showcase;

// Playback and voice
pub mod recorder;
pub mod view_tracking;
