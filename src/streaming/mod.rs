mod encode;
mod overlay;
mod session;

#[cfg(feature = "streaming")]
mod handlers;
#[cfg(feature = "streaming")]
mod server;


pub use encode::{encode_jpeg, multipart_part, BOUNDARY, CONTENT_TYPE};
pub use overlay::OverlayRenderer;
pub use session::{StreamMode, StreamSession};
pub(crate) use session::{ActiveStreamGuard, SessionContext};

#[cfg(feature = "streaming")]
pub use server::{StreamServer, StreamServerBuilder};
