//! Protobuf messages and service clients of the Bisq API daemon
//!
//! Generated at build time from `proto/grpc.proto` (package `io.bisq.protobuffer`).

#![allow(clippy::derive_partial_eq_without_eq)]

tonic::include_proto!("io.bisq.protobuffer");
