pub mod directory_publisher;
