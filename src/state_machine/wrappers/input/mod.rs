pub mod system;

pub use self::system::SystemResource;
