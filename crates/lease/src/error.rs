use teuthd_core::MachineClass;

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("lock service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lock service returned an error status {status} for {machine_class}")]
    HttpStatus { status: reqwest::StatusCode, machine_class: MachineClass },

    #[error("requested {requested} machines, lock service only leased {leased}")]
    NotEnoughMachines { requested: usize, leased: usize },
}
