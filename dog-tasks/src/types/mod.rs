pub mod ids;
pub mod state;
pub mod record;
pub mod events;

pub use ids::TaskId;
pub use state::TaskState;
pub use record::TaskInfo;
pub use events::TaskEvent;
