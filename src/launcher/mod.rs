//! Fleet orchestration: descriptors, dependency resolution, spawning,
//! monitoring, shutdown.

mod builder;
mod descriptor;
#[allow(clippy::module_inception)]
mod launcher;
mod resolve;
pub mod shutdown;
mod spawn;

pub use builder::LauncherBuilder;
pub use descriptor::{GlobalOverrides, NodeDescriptor};
pub use launcher::{LaunchPhase, Launcher};
pub use resolve::{resolve_start_order, validate_manual_order};
pub use spawn::{
    DefaultSpawner, LocalSpawner, NodeContext, NodeExit, NodeFactory, NodeFuture, NodeHandle,
    ProcessSpawner, Spawner,
};
