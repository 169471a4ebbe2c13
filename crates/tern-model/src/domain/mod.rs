mod job_metadata;
pub use job_metadata::{JobMetadata, Repository, Trigger};

mod job_phase;
pub use job_phase::JobPhase;

mod job_query;
pub use job_query::{JobPage, JobQuery};

mod job_result;
pub use job_result::JobResult;

mod job_spec;
pub use job_spec::JobSpec;

mod job_status;
pub use job_status::{JobConditions, JobStatus};

mod key_value;
pub use key_value::KeyValue;

mod log_slice;
pub use log_slice::{LogSliceEvent, LogSliceType};

mod workload;
pub use workload::{ContainerSpec, RestartPolicy, SpecError, WorkloadSpec};

pub(crate) mod time_serde;
