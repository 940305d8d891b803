// Bindings for the kernel the probe is built on, see build.rs.
#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals, dead_code, clippy::all)]

include!(concat!(env!("OUT_DIR"), "/vmlinux.rs"));
