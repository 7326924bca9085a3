//! Integration tests for the warden swarm manager

mod common;

mod admission;
mod pressure;
mod restart;
mod shared_resources;
