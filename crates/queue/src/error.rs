use teuthd_core::MachineClass;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("unexpected beanstalk response: {0}")]
    Protocol(String),

    #[error("job body failed to parse as YAML: {0}")]
    BadPayload(#[from] serde_yaml::Error),

    #[error("reporting service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reporting service returned an error status {status} for {machine_class}")]
    HttpStatus { status: reqwest::StatusCode, machine_class: MachineClass },

    #[error("job descriptor is missing its beanstalk job id")]
    MissingBeanstalkId,
}
