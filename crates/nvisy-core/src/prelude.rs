//! Convenience re-exports of the most used types.

pub use crate::content::{ContentElement, ContentType, ContentTypes, Position};
pub use crate::document::{Document, DocumentFormat, DocumentId, DocumentKind, PageRange};
pub use crate::event::{EventKind, EventSink, SharedSink, TaskEvent};
pub use crate::provider::{
    BoxedProvider, Configuration, ProviderAdapter, ProviderClass, ProviderDescriptor,
    ProviderError, ProviderErrorKind, ProviderId, ProviderResult, ProviderRole, RecognizeRequest,
};
pub use crate::quality::{FlagReason, QualityScore, Region, RegionFlag};
pub use crate::store::{DurableStore, DurableStoreExt, SharedStore};
pub use crate::{ChunkId, Error, ErrorKind, Result, ServiceHealth, ServiceStatus, TaskId};
