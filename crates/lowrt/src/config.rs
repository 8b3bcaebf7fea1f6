use once_cell::sync::OnceCell;

pub const ENV_ARENA_MIN_REGION: &str = "LOWRT_ARENA_MIN_REGION";
pub const ENV_DIR_BUF_BYTES: &str = "LOWRT_DIR_BUF_BYTES";
pub const ENV_IO_CHUNK_BYTES: &str = "LOWRT_IO_CHUNK_BYTES";

pub const DEFAULT_ARENA_MIN_REGION: usize = 1 << 20;
pub const DEFAULT_DIR_BUF_BYTES: usize = 4096;
pub const DEFAULT_IO_CHUNK_BYTES: usize = 4096;

const FLOOR_ARENA_MIN_REGION: usize = 4096;
const FLOOR_DIR_BUF_BYTES: usize = 512;
const FLOOR_IO_CHUNK_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Smallest region requested from the OS when the arena runs dry.
    pub arena_min_region: usize,
    /// Buffer handed to each raw directory-read call.
    pub dir_buf_bytes: usize,
    /// Chunk size of whole-file and pipe read loops.
    pub io_chunk_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            arena_min_region: DEFAULT_ARENA_MIN_REGION,
            dir_buf_bytes: DEFAULT_DIR_BUF_BYTES,
            io_chunk_bytes: DEFAULT_IO_CHUNK_BYTES,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let size = |name: &str, default: usize, floor: usize| {
            lookup(name)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&v| v != 0)
                .map(|v| v.max(floor))
                .unwrap_or(default)
        };
        RuntimeConfig {
            arena_min_region: size(
                ENV_ARENA_MIN_REGION,
                DEFAULT_ARENA_MIN_REGION,
                FLOOR_ARENA_MIN_REGION,
            ),
            dir_buf_bytes: size(ENV_DIR_BUF_BYTES, DEFAULT_DIR_BUF_BYTES, FLOOR_DIR_BUF_BYTES),
            io_chunk_bytes: size(
                ENV_IO_CHUNK_BYTES,
                DEFAULT_IO_CHUNK_BYTES,
                FLOOR_IO_CHUNK_BYTES,
            ),
        }
    }
}

static CONFIG: OnceCell<RuntimeConfig> = OnceCell::new();

/// Process-wide configuration, read from the environment on first use.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}
