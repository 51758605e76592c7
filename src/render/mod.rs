pub mod driver;
pub mod escape_time;
pub mod session;
pub mod viewport;
pub mod worker;

pub use driver::{Clock, FrameScheduler, IntervalScheduler, RenderLoop, SystemClock, TickOutcome};
pub use escape_time::{compute_field, compute_field_cancellable, Field, Region};
pub use session::{InputEvent, Session};
pub use viewport::Viewport;
pub use worker::{handle_request, RenderWorker, WorkerRequest, WorkerResponse};
