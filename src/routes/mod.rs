pub mod health;
pub mod playback;
pub mod relay;
pub mod xtream;
