//! PBS and SGE adapters for qbatch.
//!
//! Both schedulers come from the same `qsub` lineage: they share the
//! `select=` resource syntax, `H:M:S` wall times and exit-code based
//! submit and cancel handling, kept in [`qsub`]. PBS listings are read from
//! `qstat -f` text, SGE listings from `qstat -xml`.

pub mod pbs;
pub mod qsub;
pub mod sge;

pub use pbs::{PbsIo, PBS_HEADER_TEMPLATE};
pub use sge::{SgeIo, SGE_HEADER_TEMPLATE};
