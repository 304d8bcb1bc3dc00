//! # nesdb
//!
//! Command line front end for the versioned civic entity graph.

pub mod cli;
