//! Task handlers.

mod media;
mod traits;

pub use media::{
    ContainerPreviewsHandler, ContentPreviewHandler, DetectDuplicatesHandler, EncodingHandler,
    ScreenCaptureHandler, WebpHandler, register_default_handlers,
};
pub use traits::{FnHandler, HandlerOutput, TaskHandler, handler_fn};
