//! Built-in plugins.
//!
//! The small set of plugins every deployment needs: file and null-packet
//! input, pass-through processing, file and discard output. They double as
//! the reference implementations of the role traits.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::api::{InputPlugin, OutputPlugin, Plugin, ProcessorPlugin, StageContext, Verdict};
use crate::error::{Error, Result};
use crate::registry::PluginRepository;
use tspipe_core::{TsPacket, TS_PACKET_SIZE};

/// Register every built-in plugin into a repository.
pub fn register_builtins(repo: &PluginRepository) {
    repo.register_input("null", Arc::new(|| Box::new(NullInput::default())));
    repo.register_input("file", Arc::new(|| Box::new(FileInput::default())));
    repo.register_processor("null", Arc::new(|| Box::new(NullProcessor)));
    repo.register_output("file", Arc::new(|| Box::new(FileOutput::default())));
    repo.register_output("drop", Arc::new(|| Box::new(DropOutput)));
}

/// Input plugin generating null packets, optionally bounded.
#[derive(Default)]
pub struct NullInput {
    remaining: Option<u64>,
}

impl Plugin for NullInput {
    fn description(&self) -> &str {
        "Generate null packets"
    }

    fn configure(&mut self, args: &[String]) -> Result<()> {
        match args {
            [] => Ok(()),
            [count] => {
                let count = count.parse::<u64>().map_err(|_| {
                    Error::invalid_argument("null", format!("invalid packet count '{count}'"))
                })?;
                self.remaining = Some(count);
                Ok(())
            }
            _ => Err(Error::invalid_argument(
                "null",
                "expected at most one argument (packet count)",
            )),
        }
    }
}

impl InputPlugin for NullInput {
    fn receive(&mut self, _ctx: &dyn StageContext, buffer: &mut [TsPacket]) -> Result<usize> {
        let count = match self.remaining.as_mut() {
            None => buffer.len(),
            Some(remaining) => {
                let count = (*remaining).min(buffer.len() as u64) as usize;
                *remaining -= count as u64;
                count
            }
        };
        for packet in buffer.iter_mut().take(count) {
            *packet = TsPacket::null();
        }
        Ok(count)
    }
}

/// Input plugin reading 188-byte-aligned packets from a TS file.
#[derive(Default)]
pub struct FileInput {
    path: Option<PathBuf>,
    reader: Option<BufReader<File>>,
}

impl Plugin for FileInput {
    fn description(&self) -> &str {
        "Read packets from a transport stream file"
    }

    fn configure(&mut self, args: &[String]) -> Result<()> {
        match args {
            [path] => {
                self.path = Some(PathBuf::from(path));
                Ok(())
            }
            _ => Err(Error::invalid_argument(
                "file",
                "expected exactly one argument (input file path)",
            )),
        }
    }

    fn start(&mut self, _ctx: &dyn StageContext) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("file", "no input file configured"))?;
        debug!(path = %path.display(), "opening input file");
        self.reader = Some(BufReader::new(File::open(path)?));
        Ok(())
    }

    fn stop(&mut self, _ctx: &dyn StageContext) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

impl InputPlugin for FileInput {
    fn receive(&mut self, _ctx: &dyn StageContext, buffer: &mut [TsPacket]) -> Result<usize> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::plugin("file", "input not started"))?;

        let mut count = 0;
        let mut raw = [0u8; TS_PACKET_SIZE];
        for slot in buffer.iter_mut() {
            match reader.read_exact(&mut raw) {
                Ok(()) => {
                    *slot = TsPacket::from_bytes(raw).map_err(Error::Core)?;
                    count += 1;
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(count)
    }
}

/// Processor plugin forwarding every packet unchanged.
pub struct NullProcessor;

impl Plugin for NullProcessor {
    fn description(&self) -> &str {
        "Pass packets through unchanged"
    }
}

impl ProcessorPlugin for NullProcessor {
    fn process(&mut self, _ctx: &dyn StageContext, _packet: &mut TsPacket) -> Verdict {
        Verdict::Ok
    }
}

/// Output plugin writing packets to a TS file.
#[derive(Default)]
pub struct FileOutput {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    ignore_abort: bool,
}

impl Plugin for FileOutput {
    fn description(&self) -> &str {
        "Write packets to a transport stream file"
    }

    fn configure(&mut self, args: &[String]) -> Result<()> {
        let mut args = args.iter();
        self.path = Some(PathBuf::from(args.next().ok_or_else(|| {
            Error::invalid_argument("file", "expected an output file path")
        })?));
        for arg in args {
            match arg.as_str() {
                "ignore-abort" => self.ignore_abort = true,
                other => {
                    return Err(Error::invalid_argument(
                        "file",
                        format!("unknown option '{other}'"),
                    ))
                }
            }
        }
        Ok(())
    }

    fn start(&mut self, _ctx: &dyn StageContext) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("file", "no output file configured"))?;
        debug!(path = %path.display(), "creating output file");
        self.writer = Some(BufWriter::new(File::create(path)?));
        Ok(())
    }

    fn stop(&mut self, _ctx: &dyn StageContext) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl OutputPlugin for FileOutput {
    fn send(&mut self, _ctx: &dyn StageContext, packets: &[TsPacket]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::plugin("file", "output not started"))?;

        for packet in packets {
            if let Err(e) = writer.write_all(packet.as_bytes()) {
                // A closed downstream reader is a normal way for a pipe to
                // end when the plugin opted to ignore aborts.
                if self.ignore_abort && e.kind() == ErrorKind::BrokenPipe {
                    return Err(Error::Core(tspipe_core::Error::EndOfStream));
                }
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Output plugin discarding every packet.
pub struct DropOutput;

impl Plugin for DropOutput {
    fn description(&self) -> &str {
        "Discard packets"
    }
}

impl OutputPlugin for DropOutput {
    fn send(&mut self, _ctx: &dyn StageContext, _packets: &[TsPacket]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::TestContext;

    #[test]
    fn test_null_input_unbounded() {
        let ctx = TestContext::default();
        let mut input = NullInput::default();
        let mut buffer = vec![TsPacket::null(); 8];
        assert_eq!(input.receive(&ctx, &mut buffer).unwrap(), 8);
        assert!(buffer.iter().all(TsPacket::is_null));
    }

    #[test]
    fn test_null_input_bounded() {
        let ctx = TestContext::default();
        let mut input = NullInput::default();
        input.configure(&["5".into()]).unwrap();

        let mut buffer = vec![TsPacket::null(); 4];
        assert_eq!(input.receive(&ctx, &mut buffer).unwrap(), 4);
        assert_eq!(input.receive(&ctx, &mut buffer).unwrap(), 1);
        assert_eq!(input.receive(&ctx, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_null_input_bad_count() {
        let mut input = NullInput::default();
        assert!(input.configure(&["many".into()]).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let ctx = TestContext::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.ts");

        let mut output = FileOutput::default();
        output
            .configure(&[path.display().to_string()])
            .unwrap();
        output.start(&ctx).unwrap();

        let mut sent = Vec::new();
        for i in 0..10u16 {
            let mut packet = TsPacket::null();
            packet.set_pid(0x0100 + i);
            sent.push(packet);
        }
        output.send(&ctx, &sent).unwrap();
        output.stop(&ctx).unwrap();

        let mut input = FileInput::default();
        input.configure(&[path.display().to_string()]).unwrap();
        input.start(&ctx).unwrap();

        let mut buffer = vec![TsPacket::null(); 16];
        assert_eq!(input.receive(&ctx, &mut buffer).unwrap(), 10);
        assert_eq!(&buffer[..10], &sent[..]);
        assert_eq!(input.receive(&ctx, &mut buffer).unwrap(), 0);
        input.stop(&ctx).unwrap();
    }

    #[test]
    fn test_file_input_requires_path() {
        let ctx = TestContext::default();
        let mut input = FileInput::default();
        assert!(input.start(&ctx).is_err());
    }

    #[test]
    fn test_file_output_rejects_unknown_option() {
        let mut output = FileOutput::default();
        assert!(output
            .configure(&["out.ts".into(), "turbo".into()])
            .is_err());
    }

    #[test]
    fn test_null_processor_forwards() {
        let ctx = TestContext::default();
        let mut processor = NullProcessor;
        let mut packet = TsPacket::null();
        assert_eq!(processor.process(&ctx, &mut packet), Verdict::Ok);
    }

    #[test]
    fn test_register_builtins() {
        let repo = PluginRepository::with_loader(crate::loader::PluginLoader::empty());
        register_builtins(&repo);
        assert!(repo.get_input("null").is_ok());
        assert!(repo.get_input("file").is_ok());
        assert!(repo.get_processor("null").is_ok());
        assert!(repo.get_output("file").is_ok());
        assert!(repo.get_output("drop").is_ok());
    }
}
