use std::env;
use std::fs;
use std::io::{self, ErrorKind, Write};

use itertools::Itertools;
use sha2::{Digest, Sha256};
use vmfsrust::{Volume, dir, volume::ReadAt};

const USAGE: &str = "usage: read /path/to/volume.img [info | hb | ls [PATH] | cat PATH | dump PATH OUTPUT]";

fn main() -> vmfsrust::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(image_path) = args.get(1) else {
        eprintln!("{USAGE}");
        return Err(invalid_input("Missing image argument"));
    };
    println!("Operating on {image_path}");

    let vol = Volume::open_path(image_path)?;

    match args.get(2).map(String::as_str) {
        None | Some("info") => {
            info(&vol);
            heartbeats(&vol)
        }
        Some("hb") => heartbeats(&vol),
        Some("ls") => ls(&vol, args.get(3).map(String::as_str).unwrap_or("/")),
        Some("cat") => {
            let Some(path) = args.get(3) else {
                eprintln!("{USAGE}");
                return Err(invalid_input("cat requires a path"));
            };
            cat(&vol, path)
        }
        Some("dump") => {
            let (Some(path), Some(output)) = (args.get(3), args.get(4)) else {
                eprintln!("{USAGE}");
                return Err(invalid_input("dump requires a path and an output file"));
            };
            dump(&vol, path, output)
        }
        Some(other) => {
            eprintln!("{USAGE}");
            Err(invalid_input(&format!("unknown command '{other}'")))
        }
    }
}

fn invalid_input(msg: &str) -> vmfsrust::Error {
    io::Error::new(ErrorKind::InvalidInput, msg.to_string()).into()
}

fn info<S: ReadAt>(vol: &Volume<S>) {
    print!("{}", vol.vol_info());
    println!();
    print!("{}", vol.fs_info());
    println!();

    println!("FBB bitmap:");
    if let Some(bmh) = vol.fbb_bitmap() {
        print!("{bmh}");
    }
    println!("\nFDC bitmap:");
    print!("{}", vol.fdc_bitmap());
    println!("\nPBC bitmap:");
    if let Some(bmh) = vol.pbc_bitmap() {
        print!("{bmh}");
    }
    println!("\nSBC bitmap:");
    if let Some(bmh) = vol.sbc_bitmap() {
        print!("{bmh}");
    }
    println!();

    let metas = [
        (".fbb.sf", vol.fbb_file()),
        (".fdc.sf", vol.fdc_file()),
        (".pbc.sf", vol.pbc_file()),
        (".sbc.sf", vol.sbc_file()),
        (".vh.sf", vol.vh_file()),
    ];
    println!(
        "Meta-files: {}",
        metas
            .iter()
            .filter_map(|(name, file)| file.map(|f| format!("{name} ({} bytes)", f.size())))
            .format(", ")
    );
    println!();
}

fn heartbeats<S: ReadAt>(vol: &Volume<S>) -> vmfsrust::Result<()> {
    let active = vol.active_heartbeats()?;
    for hb in &active {
        print!("{hb}");
        println!();
    }
    println!("Active heartbeats: {}", active.len());
    Ok(())
}

fn ls<S: ReadAt>(vol: &Volume<S>, path: &str) -> vmfsrust::Result<()> {
    let dir_file = vol.open_file(path)?;
    let records = dir::read_dir(vol, &dir_file)?;
    for rec in &records {
        println!("{:>4} {:#010x} {}", rec.kind, rec.block_id, rec.name());
    }
    println!("{} records", records.len());
    Ok(())
}

fn cat<S: ReadAt>(vol: &Volume<S>, path: &str) -> vmfsrust::Result<()> {
    let file = vol.open_file(path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    file.dump(vol, 0, 0, &mut out)?;
    out.flush()?;
    Ok(())
}

fn dump<S: ReadAt>(vol: &Volume<S>, path: &str, output: &str) -> vmfsrust::Result<()> {
    let file = vol.open_file(path)?;
    println!("Processing {path:?} size={}", file.size());

    let mut out = HashingWriter {
        inner: fs::File::create(output)?,
        hasher: Sha256::new(),
    };
    let written = file.dump(vol, 0, 0, &mut out)?;
    out.flush()?;

    println!(
        "Done {path:?} bytes={written} cksum={:x}",
        out.hasher.finalize()
    );
    Ok(())
}

/// Checksums everything it writes through.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
