//! Trait keys the engine derives or checks by name.

pub const OS_NAME: &str = "system.os.name";
pub const DEVICE_CLASS: &str = "device.class";
pub const LOCALE: &str = "system.locale";
pub const TIMEZONE: &str = "system.timezone";
pub const CPU_ARCH: &str = "system.cpu.arch";

pub const PLATFORM: &str = "browser.platform";
pub const LANGUAGES: &str = "browser.languages";
pub const BROWSER_NAME: &str = "browser.name";
pub const BROWSER_ENGINE: &str = "browser.engine";
pub const BROWSER_VERSION: &str = "browser.version";
pub const USER_AGENT: &str = "browser.userAgent";
pub const CLIENT_HINTS: &str = "headers.clientHints";

pub const GPU_VENDOR: &str = "graphics.gpu.vendor";
pub const WEBGL_VENDOR: &str = "graphics.webgl.vendor";
pub const WEBGL_RENDERER: &str = "graphics.webgl.renderer";

pub const FONTS_MODE: &str = "fonts.mode";
pub const FONTS_LIST: &str = "fonts.list";

pub const VIEWPORT_WIDTH: &str = "device.viewport.width";
pub const VIEWPORT_HEIGHT: &str = "device.viewport.height";
pub const MAX_TOUCH_POINTS: &str = "device.maxTouchPoints";
pub const HARDWARE_CONCURRENCY: &str = "device.hardwareConcurrency";
pub const DEVICE_MEMORY: &str = "device.deviceMemory";

/// Identity-bearing fields compared by the batch deduper, in tuple order.
pub const DEDUPE_FIELDS: [&str; 7] = [
    USER_AGENT,
    LOCALE,
    TIMEZONE,
    VIEWPORT_WIDTH,
    VIEWPORT_HEIGHT,
    WEBGL_VENDOR,
    WEBGL_RENDERER,
];
