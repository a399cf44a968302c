use std::{
    ffi::CString,
    path::{Path, PathBuf},
};

use ffmpeg_next::{Rational, codec::Parameters};

use crate::{packet::RawPacket, stream::MediaKind};

/// Description of one output stream.
#[derive(Clone)]
pub struct OutputStreamSpec {
    pub parameters: Parameters,
    /// Time base the packets for this stream will arrive in.
    pub time_base: Rational,
    /// Packets are forwarded from the input without re-encoding.
    pub copy: bool,
}

/// Muxer side of a job.
///
/// The header must be written before `stream_time_base` is trusted: the
/// muxer may pick a different time base than the one requested.
pub trait PacketSink {
    /// Encoder the container would pick for `kind` when a profile names none.
    fn default_codec(&self, kind: MediaKind) -> Option<String>;
    fn needs_global_header(&self) -> bool;
    /// Adds a stream and returns its output index.
    fn add_stream(&mut self, spec: OutputStreamSpec) -> anyhow::Result<usize>;
    /// Creates the output file and writes the container header.
    fn write_header(&mut self) -> anyhow::Result<()>;
    fn stream_time_base(&self, index: usize) -> Option<Rational>;
    /// Writes a packet whose index and timestamps already refer to the
    /// output stream.
    fn write_packet(&mut self, packet: RawPacket) -> anyhow::Result<()>;
    /// Writes the trailer. Does nothing unless a header was written.
    fn finish(&mut self) -> anyhow::Result<()>;
}

/// Muxer over an FFmpeg output context.
///
/// The file itself is only created by `write_header`, so a job that fails
/// while adding streams leaves whatever was at `path` untouched.
pub struct AvOutput {
    inner: ffmpeg_next::format::context::Output,
    path: PathBuf,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl AvOutput {
    pub fn open(path: &Path, container: &str) -> anyhow::Result<Self> {
        let c_path = path_to_cstring(path)?;
        let c_container = CString::new(container)
            .map_err(|e| anyhow::anyhow!("invalid container name {:?}: {}", container, e))?;
        let mut ptr = std::ptr::null_mut();
        let ret = unsafe {
            ffmpeg_next::ffi::avformat_alloc_output_context2(
                &mut ptr,
                std::ptr::null(),
                c_container.as_ptr(),
                c_path.as_ptr(),
            )
        };
        if ret < 0 || ptr.is_null() {
            anyhow::bail!(
                "open output {} as {}: {}",
                path.display(),
                container,
                ffmpeg_next::Error::from(ret)
            );
        }
        Ok(Self {
            inner: unsafe { ffmpeg_next::format::context::Output::wrap(ptr) },
            path: path.to_path_buf(),
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    /// Creates (or truncates) the output file unless the container does
    /// its own I/O.
    fn open_file(&mut self) -> anyhow::Result<()> {
        if self
            .inner
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::NO_FILE)
        {
            return Ok(());
        }
        let c_path = path_to_cstring(&self.path)?;
        let ret = unsafe {
            let ctx = self.inner.as_mut_ptr();
            ffmpeg_next::ffi::avio_open(
                &mut (*ctx).pb,
                c_path.as_ptr(),
                ffmpeg_next::ffi::AVIO_FLAG_WRITE as _,
            )
        };
        if ret < 0 {
            anyhow::bail!(
                "create {}: {}",
                self.path.display(),
                ffmpeg_next::Error::from(ret)
            );
        }
        Ok(())
    }
}

fn path_to_cstring(path: &Path) -> anyhow::Result<CString> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("non UTF-8 path {}", path.display()))?;
    CString::new(path_str).map_err(|e| anyhow::anyhow!("invalid path {:?}: {}", path_str, e))
}

impl PacketSink for AvOutput {
    fn default_codec(&self, kind: MediaKind) -> Option<String> {
        let id = self.inner.format().codec(&self.path, kind.into());
        if id == ffmpeg_next::codec::Id::None {
            return None;
        }
        ffmpeg_next::encoder::find(id).map(|codec| codec.name().to_string())
    }

    fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
    }

    fn add_stream(&mut self, spec: OutputStreamSpec) -> anyhow::Result<usize> {
        let mut writer_stream = self
            .inner
            .add_stream(ffmpeg_next::encoder::find(spec.parameters.id()))?;
        writer_stream.set_parameters(spec.parameters);
        writer_stream.set_time_base(spec.time_base);
        if spec.copy {
            unsafe {
                (*writer_stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
        }
        Ok(writer_stream.index())
    }

    fn write_header(&mut self) -> anyhow::Result<()> {
        if !self.have_written_header {
            self.open_file()?;
            self.inner.write_header()?;
            self.have_written_header = true;
        }
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.inner.stream(index).map(|stream| stream.time_base())
    }

    fn write_packet(&mut self, mut packet: RawPacket) -> anyhow::Result<()> {
        if !self.have_written_header {
            anyhow::bail!("packet written before header");
        }
        let p = packet.get_mut();
        p.set_position(-1);
        p.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }
}
