pub mod disk_frame_store;
