//! Distro provisioning: architecture and manifest resolution, downloads, the
//! privileged execution bridge, launch-script templating and the pipeline
//! that drives an instance from nothing to ready.

pub mod arch;
pub mod bridge;
pub mod download;
pub mod manifest;
pub mod pipeline;
pub mod template;
