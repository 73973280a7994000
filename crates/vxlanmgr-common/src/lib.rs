//! Common infrastructure for the VXLAN overlay manager.
//!
//! This crate provides the pieces shared by the daemon and its test
//! support crate:
//!
//! - [`shell`]: Structured external commands and the [`Executor`] that runs them
//! - [`error`]: Error taxonomy for reconciliation passes
//!
//! # Example
//!
//! ```ignore
//! use vxlanmgr_common::{
//!     shell::{ShellCommand, SystemExecutor, IP_CMD},
//!     Executor, VxlanMgrResult,
//! };
//!
//! async fn bring_up(executor: &impl Executor, ifname: &str) -> VxlanMgrResult<()> {
//!     let cmd = ShellCommand::privileged(IP_CMD).args(["link", "set", "dev", ifname, "up"]);
//!     executor.execute(&cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{VxlanMgrError, VxlanMgrResult};
pub use shell::{Executor, ShellCommand, SystemExecutor};
