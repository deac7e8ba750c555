use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};

use casket_block::DataBlock;
use casket_device::{BlockDevice, BlockIndex, FileRawDevice, MemoryIndex, WalIndex};
use casket_fs::Fs;
use casket_net::{NetClientOptions, NetDevice, NetTransport};
use casket_types::{BlockId, HashKind, DEFAULT_BLOCK_SIZE};

use crate::cli::{Cli, Command};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { ref listen } => serve(&cli, listen),
        Command::Put {
            ref file,
            block_size,
        } => put(&cli, file, block_size.unwrap_or(DEFAULT_BLOCK_SIZE)),
        Command::Get { ref id, ref out } => get(&cli, id, out.as_deref()),
        Command::Rm { ref id } => remove(&cli, id),
        Command::Exists { ref id } => exists(&cli, id),
        Command::Stats { json } => stats(&cli, json),
    }
}

fn open_device(cli: &Cli) -> anyhow::Result<Arc<BlockDevice>> {
    let raw = FileRawDevice::new(&cli.data_dir.join("blocks"), HashKind::default())
        .context("opening data directory")?;
    let index: Arc<dyn BlockIndex> = if cli.wal {
        Arc::new(WalIndex::open(&cli.data_dir.join("index.wal")).context("opening index journal")?)
    } else {
        Arc::new(MemoryIndex::new())
    };
    let dev = BlockDevice::new(index, raw);
    dev.reindex().context("reindexing data directory")?;
    Ok(Arc::new(dev))
}

fn remote_device(host: &str) -> NetDevice {
    NetDevice::new(host, NetClientOptions::default())
}

fn parse_id(hex: &str) -> anyhow::Result<BlockId> {
    BlockId::from_hex(hex).with_context(|| format!("invalid block id: {hex}"))
}

fn serve(cli: &Cli, listen: &str) -> anyhow::Result<()> {
    if cli.remote.is_some() {
        bail!("serve works on the local store only");
    }
    let dev = open_device(cli)?;

    let mut transport = NetTransport::new(NetClientOptions::default());
    transport.register(dev);
    let listener = TcpListener::bind(listen).with_context(|| format!("binding {listen}"))?;
    println!("serving {} on {listen}", cli.data_dir.display());
    transport.start(listener)?;

    loop {
        thread::park();
    }
}

fn put(cli: &Cli, path: &std::path::Path, block_size: u64) -> anyhow::Result<()> {
    let id = match &cli.remote {
        Some(host) => {
            // Remote put ships the file as a single data block.
            let mut input =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let mut body = Vec::new();
            input.read_to_end(&mut body)?;
            let blk = DataBlock::from_bytes(HashKind::default(), body);
            remote_device(host).set_block(&blk.into())?
        }
        None => store_file(cli, path, block_size)?,
    };
    println!("{id}");
    Ok(())
}

fn store_file(cli: &Cli, path: &std::path::Path, block_size: u64) -> anyhow::Result<BlockId> {
    let mut input = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let fs = Fs::new(open_device(cli)?);
    let mut writer = fs.create_with_block_size(block_size);
    io::copy(&mut input, &mut writer)?;
    Ok(writer.finish()?.id)
}

fn get(cli: &Cli, id: &str, out: Option<&std::path::Path>) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let mut sink: Box<dyn Write> = match out {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };

    match &cli.remote {
        Some(host) => {
            let blk = remote_device(host).get_block(&id)?;
            sink.write_all(&blk.read_body()?)?;
        }
        None => {
            let fs = Fs::new(open_device(cli)?);
            let mut reader = fs.open(&id)?.into_reader()?;
            io::copy(&mut reader, &mut sink)?;
        }
    }
    sink.flush()?;
    Ok(())
}

fn remove(cli: &Cli, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    match &cli.remote {
        Some(host) => remote_device(host).remove_block(&id)?,
        None => open_device(cli)?.remove_block(&id)?,
    }
    println!("removed {id}");
    Ok(())
}

fn exists(cli: &Cli, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let present = match &cli.remote {
        Some(host) => remote_device(host).block_exists(&id)?,
        None => open_device(cli)?.block_exists(&id),
    };
    println!("{present}");
    Ok(())
}

fn stats(cli: &Cli, json: bool) -> anyhow::Result<()> {
    if cli.remote.is_some() {
        bail!("stats works on the local store only");
    }
    let stats = open_device(cli)?.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("data blocks:   {}", stats.data_blocks);
        println!("index blocks:  {}", stats.index_blocks);
        println!("tree blocks:   {}", stats.tree_blocks);
        println!("meta blocks:   {}", stats.meta_blocks);
        println!("total blocks:  {}", stats.total_blocks);
        println!("on disk:       {}", stats.on_disk_blocks);
        println!("used bytes:    {}", stats.used_bytes);
    }
    Ok(())
}
