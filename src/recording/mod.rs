//! Recording entities and the persistence/storage seams the pipeline uses.

pub mod model;
pub mod repository;
pub mod storage;

pub use model::{
    extension_of, AgeRange, AudioFormat, Gender, ProcessingResult, QualityMetrics, Recording,
    RecordingId, RecordingType, SpeakerInfo,
};
pub use repository::{InMemoryRepository, JsonFileRepository, RecordingRepository, RepositoryError};
pub use storage::{temp_ref, BlobStorage, FsStorage, InMemoryStorage, StorageError};
