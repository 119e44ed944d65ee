//! Frame sinks used by the command-line driver.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use liquid_sandbox_core::{Droplet, WaterView};
use liquid_sandbox_rendering::{ascii_frame, FrameSink, WaterFrame, WaterPalette};
use log::info;

/// Writes a character frame to a stream every `every` ticks.
#[derive(Debug)]
pub(crate) struct AsciiSink<W> {
    writer: W,
    every: u64,
}

impl<W: Write> AsciiSink<W> {
    pub(crate) fn new(writer: W, every: u64) -> Self {
        Self { writer, every }
    }
}

impl<W: Write> FrameSink for AsciiSink<W> {
    fn present(&mut self, tick: u64, view: WaterView<'_>, droplets: &[Droplet]) -> Result<()> {
        if self.every == 0 || tick % self.every != 0 {
            return Ok(());
        }
        writeln!(self.writer, "-- tick {tick} --")?;
        self.writer
            .write_all(ascii_frame(view, droplets).as_bytes())
            .context("failed to write ascii frame")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Saves each presented frame as a PPM image, overwriting the previous one.
#[derive(Debug)]
pub(crate) struct PpmSink {
    path: PathBuf,
    palette: WaterPalette,
}

impl PpmSink {
    pub(crate) fn new(path: PathBuf, palette: WaterPalette) -> Self {
        Self { path, palette }
    }
}

impl FrameSink for PpmSink {
    fn present(&mut self, tick: u64, view: WaterView<'_>, droplets: &[Droplet]) -> Result<()> {
        let frame = WaterFrame::capture(view, droplets, &self.palette)?;
        let file = File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        frame
            .write_ppm(&mut writer)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        writer.flush()?;
        info!(
            "wrote {}x{} frame of tick {tick} to {}",
            frame.width(),
            frame.height(),
            self.path.display()
        );
        Ok(())
    }
}
