//! Icon Resolution
//!
//! Strategy-chain icon lookup over an injected platform capability, with
//! in-memory and on-disk caches.

pub mod cache;
pub mod freedesktop;
pub mod platform;
pub mod resolver;

pub use cache::{CacheError, CacheStats, IconDiskCache};
pub use freedesktop::FreedesktopPlatform;
pub use platform::{IconPlatform, NativeHandle, PlatformError};
pub use resolver::{clamp_icon_size, IconImage, IconResolver, Strategy, MAX_ICON_SIZE};
