use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("num_detections is {declared} but {actual} detections were sent")]
    CountMismatch { declared: usize, actual: usize },
}
