mod settings;
mod synthetic;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use hidingin_engine::capture::{CaptureArgs, CompositeCapture, CompositeCaptureArgs, PipelineMerger};
use hidingin_engine::device::{GpuInit, WgpuBackend};
use hidingin_engine::events::{COMPOSITE_PUBLISHED, EventHub, EventParams};
use hidingin_engine::logging::{LoggingConfig, init_logging};
use hidingin_engine::pipeline::{GpuPipeline, PipelineConfig};
use hidingin_engine::resource::{PixelFormat, TextureCache, TextureDesc};

use settings::Settings;
use synthetic::SyntheticSource;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    let settings = Settings::from_env()?;
    log::info!("studio settings: {settings:?}");

    let init = GpuInit {
        backends: wgpu::Backends::from_env().unwrap_or(wgpu::Backends::all()),
        ..Default::default()
    };
    let backend = Arc::new(WgpuBackend::new_blocking(init).context("GPU initialization failed")?);

    let pipeline = Arc::new(GpuPipeline::new(
        backend.clone(),
        PipelineConfig {
            render_in_place: settings.render_in_place,
            ..Default::default()
        },
    )?);
    let cache = TextureCache::new();
    let events = Arc::new(EventHub::new());

    let repaints = Arc::new(AtomicU64::new(0));
    {
        let repaints = Arc::clone(&repaints);
        events.register_listener(COMPOSITE_PUBLISHED, move |params: &EventParams| {
            repaints.fetch_add(1, Ordering::Relaxed);
            log::trace!("repaint requested for cycle {:?}", params.int("cycle"));
        });
    }

    let output = TextureDesc::new(WIDTH, HEIGHT, PixelFormat::Bgra8Unorm);
    let merger = PipelineMerger::new(pipeline.clone(), &cache, output).context("failed to allocate composite targets")?;
    let capture = CompositeCapture::with_events(
        CompositeCaptureArgs::new(settings.sources, settings.interval_ms),
        Arc::new(merger),
        events.clone(),
    );

    let frame = synthetic::frame_desc(WIDTH, HEIGHT);
    capture.add_source(
        Box::new(SyntheticSource::desktop(backend.clone(), pipeline.clone(), frame)),
        CaptureArgs::whole_desktop("desktop").excluding_windows([-1]),
    )?;
    for index in 1..settings.sources {
        let name = format!("app-{index}");
        capture.add_source(
            Box::new(SyntheticSource::application(&name, backend.clone(), pipeline.clone(), frame, index)),
            CaptureArgs::application(name.clone(), name),
        )?;
    }

    capture.start_all()?;
    let started = Instant::now();
    while started.elapsed() < settings.run_for {
        if settings.render_in_place {
            if pipeline.pending_render_jobs() > 0 {
                pipeline.execute_render_tasks_in_place()?;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        } else {
            events.wait_for(COMPOSITE_PUBLISHED, std::time::Duration::from_millis(100));
        }
    }
    capture.stop_all();
    pipeline.stop();

    let elapsed = started.elapsed().as_secs_f32();
    let published = capture.publish_count();
    log::info!(
        "{published} composite frame(s) in {elapsed:.2}s ({:.1} fps), {} repaint request(s), {} cached texture(s)",
        published as f32 / elapsed.max(f32::EPSILON),
        repaints.load(Ordering::Relaxed),
        cache.len()
    );
    if let Some(latest) = capture.latest_composite_frame() {
        log::info!(
            "latest frame: cycle {} layers {:?} (stale {:?}) into `{}`",
            latest.cycle,
            latest.event_names,
            latest.stale_keys,
            latest.texture.label()
        );
    }
    Ok(())
}
