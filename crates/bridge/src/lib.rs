//! owl bridge
//!
//! Local WebSocket channel between the test runner and the instrumentation
//! client running inside the app under test.
//!
//! ```text
//!  test runner ──HTTP POST /screenshot/:name──▶ ┌──────────────┐
//!                                               │ BridgeServer │──ws /app──▶ in-app client
//!  test runner ◀──── report / PNG bytes ─────── │   session    │◀── PNG ───
//!                                               └──────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod visual;

pub use error::{BridgeError, BridgeResult};
pub use protocol::{Command, Request, Response};
pub use server::{BridgeConfig, BridgeHandle, BridgeServer};
pub use session::{SessionHandle, SessionState};
pub use visual::{ScreenshotOutcome, ScreenshotReport, ScreenshotStore};
