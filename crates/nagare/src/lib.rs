//! ```text
//! ┌───────────────────────┐                ┌────────────────────┐
//! │                       │   seg_0.m4s    │                    │
//! │                       ├────────────────►                    ├───┐
//! │                       │                │                    │   │fetch
//! │                       │   seg_1.m4s    │                    ◄───┘
//! │  Notification Source  ├────────────────►  DrainController   │
//! │                       │                │                    ├───┐
//! │                       │   seg_2.m4s    │       [FIFO]       │   │append at offset
//! │                       ├────────────────►                    ◄───┘
//! │                       │                │                    │
//! └───────────────────────┘                └─────────┬──────────┘
//!                                                    │
//!                                          ┌─────────▼──────────┐
//!                                          │     BufferSink     │
//!                                          └────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod notify;
pub mod player;
pub mod queue;
pub mod relay;
pub mod sink;
pub mod util;

pub use config::PlayerConfig;
pub use error::{NagareError, NagareResult};
pub use locator::FragmentLocator;
pub use player::{Player, PlayerHandle};
