//! Building blocks for end-to-end scenarios against an eventually
//! consistent cluster.
//!
//! A typical scenario creates objects from templates, polls until the
//! cluster has converged, asserts on the converged state and removes what it
//! created. [`Scenario`] ties those steps together; the pieces are usable on
//! their own.
//!
//! ```ignore
//! let report = Scenario::new(ctx)
//!     .run(async |s: &mut Scenario| {
//!         s.create_namespace()?;
//!         let cm = s.ctx().resource("configmap", uniq("cm"));
//!         let desc = ResourceDescriptor::new(s.ctx().fixture("configmap.yaml"), cm.clone())
//!             .param("LEVEL", "Debug");
//!         s.create(&desc).await?;
//!         s.ctx().resources().wait_for_exists(&cm, s.ctx().poller()).await?;
//!         Ok(())
//!     })
//!     .await;
//! ```

pub mod expect;
pub mod naming;
pub mod poll;
pub mod resource;
pub mod scenario;
pub mod task;
pub mod template;

pub use expect::{
    AssertionError, count_lines_matching, expect_at_least, expect_contains,
    expect_eq,
};
pub use naming::{random_suffix, uniq};
pub use poll::{CheckError, PollError, Poller, Readiness};
pub use resource::{
    DeletePolicy, ResourceDescriptor, ResourceError, ResourceGuard,
    ResourceManager, ResourceRef,
};
pub use scenario::{
    Outcome, Scenario, ScenarioContext, ScenarioContextBuilder, ScenarioError,
    ScenarioReport,
};
pub use task::{BackgroundTask, TaskError};
pub use template::{
    LocalRenderer, OcProcessRenderer, Params, Template, TemplateError,
    TemplateRenderer,
};
