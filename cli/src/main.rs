use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use mfsutil_core::{discover_images, enumerate_disks, Disk, FileDisk, FileFlags, FormatOptions};
use mfsutil_filesystems::{install_tree, Bootloader, MfsFormatter, MfsVerifier, MfsVolume};
use std::path::{Path, PathBuf};

mod shell;

#[derive(Parser)]
#[command(name = "mfsutil")]
#[command(about = "Build and inspect MFS disk images", long_about = None)]
#[command(version)]
struct Cli {
    /// Disk image to operate on; repeat for several. Defaults to *.img in the working directory
    #[arg(long = "disk", global = true)]
    disks: Vec<PathBuf>,

    /// First sector of the MFS partition on each disk
    #[arg(long, global = true, default_value_t = 0)]
    partition_start: u64,

    /// Sector size of the disk images
    #[arg(long, global = true, default_value_t = 512)]
    sector_size: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate disks
    Disks {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a zero-filled disk image
    CreateImage {
        path: PathBuf,
        /// Image size in MiB
        #[arg(long, default_value_t = 64)]
        size_mb: u64,
    },
    /// Format a disk with MFS
    Format {
        /// Disk index from `mfsutil disks`
        disk: usize,
        /// Partition name
        #[arg(long)]
        name: Option<String>,
        /// Install stage1/stage2 and mark the volume bootable
        #[arg(long)]
        bootable: bool,
        #[arg(long)]
        stage1: Option<PathBuf>,
        #[arg(long)]
        stage2: Option<PathBuf>,
        /// Override the size-derived bucket size (4, 8, 16, 32 or 64)
        #[arg(long)]
        sectors_per_bucket: Option<u16>,
        /// Load format options from a JSON file; flags given here take precedence
        #[arg(long)]
        options: Option<PathBuf>,
        /// Show the layout without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Copy a host file onto a disk
    Write {
        file: PathBuf,
        disk: usize,
        /// Destination path on the volume (defaults to /<file name>)
        #[arg(long)]
        dest: Option<String>,
        #[arg(long)]
        system: bool,
        #[arg(long)]
        security: bool,
    },
    /// Create a directory
    Mkdir {
        path: String,
        disk: usize,
        #[arg(long)]
        system: bool,
    },
    /// List a directory
    Ls { path: String, disk: usize },
    /// Print a file, or save it with --output
    Cat {
        path: String,
        disk: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the record of an entry
    Stat {
        path: String,
        disk: usize,
        #[arg(long)]
        json: bool,
    },
    /// Check volume consistency
    Verify { disk: usize },
    /// Install a host directory tree (and optionally the bootloader)
    Install {
        disk: usize,
        /// Host directory to mirror into the volume root
        #[arg(long, default_value = "deploy/hdd")]
        root: PathBuf,
        /// Also write stage1/stage2 into the reserved area
        #[arg(long)]
        bootloader: bool,
        #[arg(long, default_value = "deploy/stage1.sys")]
        stage1: PathBuf,
        #[arg(long, default_value = "deploy/stage2.sys")]
        stage2: PathBuf,
    },
    /// Interactive prompt: format, write, ls, install, quit
    Shell,
}

/// Candidate disks and how to address the partition on them
pub(crate) struct Session {
    candidates: Vec<PathBuf>,
    partition_start: u64,
    sector_size: u32,
}

impl Session {
    fn new(disks: Vec<PathBuf>, partition_start: u64, sector_size: u32) -> anyhow::Result<Self> {
        let candidates = if disks.is_empty() {
            let cwd = std::env::current_dir().context("reading the working directory")?;
            discover_images(&cwd)?
        } else {
            disks
        };
        Ok(Self {
            candidates,
            partition_start,
            sector_size,
        })
    }

    fn disk_path(&self, index: usize) -> anyhow::Result<&Path> {
        match self.candidates.get(index) {
            Some(path) => Ok(path),
            None if self.candidates.is_empty() => {
                bail!("No disks available. Pass --disk <IMAGE> or run from a directory with *.img files")
            }
            None => bail!(
                "Disk {} does not exist; {} disks available",
                index,
                self.candidates.len()
            ),
        }
    }

    fn open_disk(&self, index: usize) -> anyhow::Result<FileDisk> {
        let path = self.disk_path(index)?;
        FileDisk::open(path, self.sector_size)
            .with_context(|| format!("opening disk image {}", path.display()))
    }

    pub(crate) fn open_volume(&self, index: usize) -> anyhow::Result<MfsVolume<FileDisk>> {
        let disk = self.open_disk(index)?;
        let path = self.disk_path(index)?;
        MfsVolume::open(disk, self.partition_start)
            .with_context(|| format!("opening MFS volume on {}", path.display()))
    }

    pub(crate) fn list_disks(&self, json: bool) -> anyhow::Result<()> {
        let disks = enumerate_disks(&self.candidates, self.sector_size)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&disks)?);
            return Ok(());
        }
        if disks.is_empty() {
            println!("No disks found.");
            return Ok(());
        }
        println!("Available disks:\n");
        for disk in disks {
            println!("Disk {}: {}", disk.index, disk.path.display());
            println!("  Size: {:.2} MB", disk.size as f64 / 1_048_576.0);
            println!(
                "  Geometry: {} sectors of {} bytes, {} heads, {} sectors/track",
                disk.geometry.total_sectors,
                disk.geometry.bytes_per_sector,
                disk.geometry.heads_per_cylinder,
                disk.geometry.sectors_per_track
            );
            if disk.read_only {
                println!("  Read-only: Yes");
            }
            println!();
        }
        Ok(())
    }

    pub(crate) fn format(&self, index: usize, options: FormatOptions, dry_run: bool) -> anyhow::Result<()> {
        let disk = self.open_disk(index)?;
        let total = disk.geometry().total_sectors;
        if self.partition_start >= total {
            bail!("Partition start {} lies past the end of the disk", self.partition_start);
        }
        let sectors = total - self.partition_start;
        let formatter = MfsFormatter::new(options);

        if dry_run {
            let layout = formatter.plan(self.sector_size as u64, self.partition_start, sectors)?;
            println!("Dry run for disk {}:", index);
            println!("  Sectors per bucket: {}", layout.sectors_per_bucket);
            println!("  Reserved sectors: {}", layout.reserved_sectors);
            println!("  Master record: sector {}", layout.master_record_sector);
            println!("  Master mirror: sector {}", layout.mirror_record_sector);
            println!("  Bucket map: sector {} ({} bytes)", layout.map_sector, layout.map_size);
            println!("  Data buckets: {}", layout.data_buckets());
            return Ok(());
        }

        let mut volume = formatter.format(disk, self.partition_start, sectors)?;
        let stats = volume.statistics()?;
        println!("Format completed: '{}'", stats.partition_name);
        println!(
            "  {} buckets of {} bytes, {} free",
            stats.data_buckets, stats.bucket_bytes, stats.free_buckets
        );
        if stats.bootable {
            println!("  Bootable: Yes");
        }
        Ok(())
    }

    pub(crate) fn write(&self, file: &Path, index: usize, dest: Option<String>, flags: FileFlags) -> anyhow::Result<()> {
        let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let dest = match dest {
            Some(dest) => dest,
            None => {
                let name = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow::anyhow!("{} has no usable file name", file.display()))?;
                format!("/{}", name)
            }
        };

        let mut volume = self.open_volume(index)?;
        let outcome = volume.write_file(&dest, flags, Some(&data))?;
        volume.flush()?;
        println!("Wrote {} ({} bytes): {:?}", dest, data.len(), outcome);
        Ok(())
    }

    pub(crate) fn list(&self, path: &str, index: usize) -> anyhow::Result<()> {
        let mut volume = self.open_volume(index)?;
        let entries = volume.list_directory(path)?;
        if entries.is_empty() {
            println!("(empty)");
        }
        for entry in entries {
            if entry.is_directory() {
                println!("Dir: {}", entry.name);
            } else {
                println!("File: {} ({} Bytes)", entry.name, entry.size);
            }
        }
        Ok(())
    }

    pub(crate) fn install(&self, index: usize, root: &Path, bootloader: Option<Bootloader>) -> anyhow::Result<()> {
        let mut volume = self.open_volume(index)?;
        if let Some(bootloader) = bootloader {
            volume.install_bootloader(&bootloader)?;
            println!("Bootloader installed");
        }
        let report = install_tree(&mut volume, root)?;
        println!(
            "Installed {} files ({} bytes), {} new directories",
            report.files, report.bytes, report.directories
        );
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn file_flags(system: bool, security: bool) -> FileFlags {
    let mut flags = FileFlags::default();
    if system {
        flags = flags.with(FileFlags::SYSTEM);
    }
    if security {
        flags = flags.with(FileFlags::SECURITY);
    }
    flags
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::CreateImage { path, size_mb } = &cli.command {
        let size = size_mb * 1024 * 1024;
        FileDisk::create(path, size, cli.sector_size)?;
        println!("Created {} ({} MB)", path.display(), size_mb);
        return Ok(());
    }

    let session = Session::new(cli.disks, cli.partition_start, cli.sector_size)?;

    match cli.command {
        Commands::CreateImage { .. } => Ok(()),
        Commands::Disks { json } => session.list_disks(json),
        Commands::Format {
            disk,
            name,
            bootable,
            stage1,
            stage2,
            sectors_per_bucket,
            options,
            dry_run,
        } => {
            let mut format_options = match options {
                Some(path) => FormatOptions::from_json_file(&path)
                    .with_context(|| format!("loading format options from {}", path.display()))?,
                None => FormatOptions::default(),
            };
            if let Some(name) = name {
                format_options.partition_name = name;
            }
            if bootable {
                format_options.bootable = true;
            }
            if let Some(stage1) = stage1 {
                format_options.stage1_path = stage1;
            }
            if let Some(stage2) = stage2 {
                format_options.stage2_path = stage2;
            }
            if sectors_per_bucket.is_some() {
                format_options.sectors_per_bucket = sectors_per_bucket;
            }
            info!("Format options: {:?}", format_options);
            session.format(disk, format_options, dry_run)
        }
        Commands::Write {
            file,
            disk,
            dest,
            system,
            security,
        } => session.write(&file, disk, dest, file_flags(system, security)),
        Commands::Mkdir { path, disk, system } => {
            let mut volume = session.open_volume(disk)?;
            let outcome = volume.create_directory(&path, file_flags(system, false))?;
            volume.flush()?;
            println!("{}: {:?}", path, outcome);
            Ok(())
        }
        Commands::Ls { path, disk } => session.list(&path, disk),
        Commands::Cat { path, disk, output } => {
            let mut volume = session.open_volume(disk)?;
            let data = volume.read_file(&path)?;
            match output {
                Some(output) => {
                    std::fs::write(&output, &data)
                        .with_context(|| format!("writing {}", output.display()))?;
                    println!("Saved {} bytes to {}", data.len(), output.display());
                }
                None => print!("{}", String::from_utf8_lossy(&data)),
            }
            Ok(())
        }
        Commands::Stat { path, disk, json } => {
            let mut volume = session.open_volume(disk)?;
            let record = volume.stat(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("Name: {}", record.name);
                println!("Type: {}", if record.is_directory() { "Directory" } else { "File" });
                println!("Flags: {:#010x}", record.flags.0);
                println!("Size: {} bytes", record.size);
                println!("Allocated: {} bytes", record.allocated_size);
                println!("Start bucket: {:#x} (run of {})", record.start_bucket, record.start_length);
                println!("Checksum: {:#010x}", record.data_checksum);
            }
            Ok(())
        }
        Commands::Verify { disk } => {
            let mut volume = session.open_volume(disk)?;
            let result = MfsVerifier::verify(&mut volume)?;
            print!("{}", MfsVerifier::generate_report(&result));
            if !result.is_valid {
                bail!("Volume verification failed");
            }
            Ok(())
        }
        Commands::Install {
            disk,
            root,
            bootloader,
            stage1,
            stage2,
        } => {
            let loader = if bootloader {
                Some(Bootloader::load(&stage1, &stage2)?)
            } else {
                None
            };
            session.install(disk, &root, loader)
        }
        Commands::Shell => shell::run(&session),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are not failures
            let code = if e.use_stderr() { 255 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
