//! Physical memory management: the frame bitmap allocator and the
//! per-thread section-table builder that sits on top of it.
pub mod address_space;
pub mod frame_allocator;
