//! Shroud CLI - self-encrypt files into a local chunk store.
//!
//! Provides commands for:
//! - Storing files as encrypted chunks plus a data map
//! - Restoring files from a data map
//! - Inspecting and deleting stored items
//! - Sealing data maps under a pair of identifiers

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use shroud_core::{ChunkName, HashKind};
use shroud_encrypt::{
    CompressionMode, DataMap, DataMapCodec, EncryptorConfig, EncryptorStream, SelfEncryptor,
};
use shroud_store::{ChunkStore, RocksChunkStore, StoreConfig};

/// Shroud self-encryption CLI.
#[derive(Parser)]
#[command(name = "shroud")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.shroud/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Self-encrypt a file into the chunk store
    Put {
        /// File to store
        file: PathBuf,

        /// Item name (default: the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Write the data map here instead of the maps directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore an item
    Get {
        /// Item name or data map path
        item: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the data map of an item
    Info {
        /// Item name or data map path
        item: String,
    },

    /// Delete an item's data map and every chunk no other stored map uses
    Rm {
        /// Item name or data map path
        item: String,
    },

    /// Show chunk store statistics
    Stats,

    /// Encrypt a data map under a parent and item identifier
    Seal {
        /// Item name or data map path
        item: String,

        /// Parent identifier
        #[arg(long)]
        parent: String,

        /// Item identifier
        #[arg(long)]
        id: String,

        /// Output file for the sealed map
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decrypt a sealed data map
    Unseal {
        /// Sealed map file
        sealed: PathBuf,

        /// Parent identifier
        #[arg(long)]
        parent: String,

        /// Item identifier
        #[arg(long)]
        id: String,

        /// Item name to save the opened map under
        #[arg(short, long)]
        name: String,
    },
}

/// Settings read from the configuration file.
#[derive(Debug, Clone)]
struct CliConfig {
    store: StoreConfig,
    encryptor: EncryptorConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::new(expand_tilde(Path::new("~/.shroud"))),
            encryptor: EncryptorConfig::default(),
        }
    }
}

impl CliConfig {
    /// Engine configuration with the store's cache budget applied.
    fn engine_config(&self) -> EncryptorConfig {
        EncryptorConfig {
            read_cache_bytes: self.store.cache_bytes,
            ..self.encryptor.clone()
        }
    }
}

/// Load configuration from TOML file.
fn load_config(path: &Path) -> Result<CliConfig> {
    let path = expand_tilde(path);

    if !path.exists() {
        debug!("No config file found at {:?}, using defaults", path);
        return Ok(CliConfig::default());
    }

    let content = fs::read_to_string(&path).context("Failed to read config file")?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<CliConfig> {
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;
    let mut config = CliConfig::default();

    // Parse [store] section
    if let Some(store) = toml.get("store") {
        if let Some(path) = store.get("path").and_then(|v| v.as_str()) {
            config.store.base_path = expand_tilde(Path::new(path));
        }
        if let Some(sync) = store.get("sync_writes").and_then(|v| v.as_bool()) {
            config.store.sync_writes = sync;
        }
        if let Some(cache_mb) = store.get("cache_mb").and_then(|v| v.as_integer()) {
            config.store.cache_bytes = cache_mb as u64 * 1024 * 1024;
        }
    }

    // Parse [encryptor] section
    if let Some(encryptor) = toml.get("encryptor") {
        let target = &mut config.encryptor;
        if let Some(kib) = encryptor.get("chunk_size_kib").and_then(|v| v.as_integer()) {
            target.chunk_size = u32::try_from(kib * 1024).context("chunk_size_kib out of range")?;
        }
        if let Some(max) = encryptor.get("max_inline_size").and_then(|v| v.as_integer()) {
            target.max_inline_size = usize::try_from(max).context("Invalid max_inline_size")?;
        }
        if let Some(mb) = encryptor.get("queue_mb").and_then(|v| v.as_integer()) {
            target.queue_capacity = usize::try_from(mb * 1024 * 1024).context("Invalid queue_mb")?;
        }
        if let Some(hash) = encryptor.get("hash").and_then(|v| v.as_str()) {
            target.hash_kind = match hash {
                "sha512" => HashKind::Sha512,
                "blake3" => HashKind::Blake3,
                other => bail!("Unknown hash {other:?}, expected sha512 or blake3"),
            };
        }
        if let Some(mode) = encryptor.get("compression").and_then(|v| v.as_str()) {
            target.compression = CompressionMode::parse(mode)
                .with_context(|| format!("Unknown compression mode {mode:?}"))?;
        }
        if let Some(level) = encryptor.get("compression_level").and_then(|v| v.as_integer()) {
            target.compression_level = i32::try_from(level).context("Invalid compression_level")?;
        }
    }

    config.encryptor.validate().context("Invalid [encryptor] settings")?;
    Ok(config)
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn open_store(config: &CliConfig) -> Result<Arc<RocksChunkStore>> {
    let store = RocksChunkStore::open_config(&config.store).with_context(|| {
        format!("Failed to open chunk store at {:?}", config.store.chunks_path())
    })?;
    Ok(Arc::new(store))
}

/// Resolves an item argument to a data map path.
///
/// Existing files are used as-is; anything else names a map in the maps
/// directory.
fn map_path(config: &CliConfig, item: &str) -> PathBuf {
    let direct = PathBuf::from(item);
    if direct.is_file() {
        return direct;
    }
    config.store.maps_path().join(format!("{item}.map"))
}

fn read_map(path: &Path) -> Result<DataMap> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read data map {:?}", path))?;
    DataMap::deserialize(&bytes).with_context(|| format!("Invalid data map {:?}", path))
}

fn write_map(path: &Path, map: &DataMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create maps directory")?;
    }
    fs::write(path, map.serialize()).with_context(|| format!("Failed to write data map {:?}", path))
}

fn cmd_put(config: &CliConfig, file: &Path, name: Option<String>, output: Option<PathBuf>) -> Result<PathBuf> {
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Cannot derive an item name from the file path")?,
    };
    let store = open_store(config)?;

    let encryptor = SelfEncryptor::new(store, config.engine_config())?.with_name_hint(file);
    let mut stream = EncryptorStream::new(encryptor);
    let mut input = BufReader::new(File::open(file).with_context(|| format!("Failed to open {:?}", file))?);
    let copied = io::copy(&mut input, &mut stream).context("Failed to encrypt file")?;
    let map = stream.into_data_map()?;

    let path = output.unwrap_or_else(|| config.store.maps_path().join(format!("{name}.map")));
    write_map(&path, &map)?;

    info!(name = %name, size = copied, chunks = map.chunks.len(), "Stored item");
    println!("Stored {name}: {copied} bytes in {} chunks", map.chunks.len());
    println!("Data map: {}", path.display());
    Ok(path)
}

fn cmd_get(config: &CliConfig, item: &str, output: Option<PathBuf>) -> Result<u64> {
    let map = read_map(&map_path(config, item))?;
    let store = open_store(config)?;
    let mut stream = EncryptorStream::new(SelfEncryptor::open(store, map, config.engine_config())?);

    let copied = match output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(&path).with_context(|| format!("Failed to create {:?}", path))?);
            let n = io::copy(&mut stream, &mut out)?;
            out.flush()?;
            n
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let n = io::copy(&mut stream, &mut out)?;
            out.flush()?;
            n
        }
    };
    debug!(item, size = copied, "Restored item");
    Ok(copied)
}

fn cmd_info(config: &CliConfig, item: &str) -> Result<()> {
    let path = map_path(config, item);
    let map = read_map(&path)?;
    let flags = map.encoding_flags;

    println!("Data map:     {}", path.display());
    println!("Size:         {} bytes", map.total_size);
    println!("Flags:        {:#06x} ({:?}, {:?})", flags.to_bits(), flags.hash, flags.compression);
    if map.is_inline() {
        println!("Inline:       yes");
        return Ok(());
    }
    println!("Chunks:       {}", map.chunks.len());
    for (offset, chunk) in map.chunk_offsets().iter().zip(&map.chunks) {
        println!(
            "  @{:<10} {:>8} -> {:>8}  {}",
            offset,
            chunk.pre_size,
            chunk.size,
            chunk.hash.to_hex()
        );
    }
    Ok(())
}

/// Chunk names used by the maps in the maps directory, except `skip`.
///
/// Identical content encrypts to identical chunks, so items may share them.
fn chunks_in_other_maps(config: &CliConfig, skip: &Path) -> Result<HashSet<ChunkName>> {
    let mut names = HashSet::new();
    let entries = match fs::read_dir(config.store.maps_path()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e).context("Failed to list data maps"),
    };
    let skip = fs::canonicalize(skip).unwrap_or_else(|_| skip.to_path_buf());

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "map") {
            continue;
        }
        if fs::canonicalize(&path).map_or(false, |p| p == skip) {
            continue;
        }
        match read_map(&path) {
            Ok(map) => names.extend(map.chunks.iter().map(|c| c.hash)),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable data map"),
        }
    }
    Ok(names)
}

fn cmd_rm(config: &CliConfig, item: &str) -> Result<()> {
    let path = map_path(config, item);
    let map = read_map(&path)?;
    let shared = chunks_in_other_maps(config, &path)?;
    let store = open_store(config)?;

    let mut removed = 0usize;
    for chunk in map.chunks.iter().filter(|c| !shared.contains(&c.hash)) {
        store
            .delete(&chunk.hash)
            .with_context(|| format!("Failed to delete chunk {}", chunk.hash))?;
        removed += 1;
    }
    fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;

    let kept = map.chunks.len() - removed;
    debug!(item, removed, kept, "Removed item");
    println!("Removed {item} ({removed} chunks, {kept} shared with other items)");
    Ok(())
}

fn cmd_stats(config: &CliConfig) -> Result<()> {
    let store = open_store(config)?;
    let chunks = store.list_chunks()?;
    let bytes = store.total_size()?;
    let maps = match fs::read_dir(config.store.maps_path()) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "map"))
            .count(),
        Err(_) => 0,
    };

    println!("Store:   {}", config.store.base_path.display());
    println!("Items:   {maps}");
    println!("Chunks:  {}", chunks.len());
    println!("Bytes:   {bytes}");
    Ok(())
}

fn cmd_seal(config: &CliConfig, item: &str, parent: &str, id: &str, output: &Path) -> Result<()> {
    let map = read_map(&map_path(config, item))?;
    let sealed = DataMapCodec::encrypt(parent.as_bytes(), id.as_bytes(), &map)?;
    fs::write(output, &sealed).with_context(|| format!("Failed to write {:?}", output))?;
    println!("Sealed {item} ({} bytes)", sealed.len());
    Ok(())
}

fn cmd_unseal(config: &CliConfig, sealed: &Path, parent: &str, id: &str, name: &str) -> Result<PathBuf> {
    let bytes = fs::read(sealed).with_context(|| format!("Failed to read {:?}", sealed))?;
    let map = DataMapCodec::decrypt(parent.as_bytes(), id.as_bytes(), &bytes)
        .context("Failed to open sealed data map")?;

    // Chunks must be present for the map to be useful
    let store = open_store(config)?;
    for chunk in &map.chunks {
        if !store.has(&chunk.hash)? {
            bail!("Chunk {} of the sealed map is not in the store", chunk.hash);
        }
    }

    let path = config.store.maps_path().join(format!("{name}.map"));
    write_map(&path, &map)?;
    println!("Opened {name}: {} bytes", map.total_size);
    Ok(path)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Put { file, name, output } => {
            cmd_put(&config, &file, name, output)?;
        }
        Commands::Get { item, output } => {
            cmd_get(&config, &item, output)?;
        }
        Commands::Info { item } => cmd_info(&config, &item)?,
        Commands::Rm { item } => cmd_rm(&config, &item)?,
        Commands::Stats => cmd_stats(&config)?,
        Commands::Seal {
            item,
            parent,
            id,
            output,
        } => cmd_seal(&config, &item, &parent, &id, &output)?,
        Commands::Unseal {
            sealed,
            parent,
            id,
            name,
        } => {
            cmd_unseal(&config, &sealed, &parent, &id, &name)?;
        }
    }

    Ok(())
}
