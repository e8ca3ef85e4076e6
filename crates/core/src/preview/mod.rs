mod cache;
mod service;

pub use cache::PreviewCache;
pub use service::{
    thumbnail_offset, PreviewEvent, PreviewHandle, PreviewOutcome, PreviewRequest,
    PreviewService, PreviewSlot, RequestState, RequestTracker,
};
