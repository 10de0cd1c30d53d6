//! Root-wide name catalogs.

mod component_names;
mod hostnames;

pub use component_names::{ComponentNames, MAX_COMPONENT_NAMES};
pub use hostnames::{HostResolver, Hostnames, HostsFileResolver};
