//! Execution plan to FFmpeg command compiler.
//!
//! The compiled graph has this shape:
//!
//! ```text
//! [k:v] trim,setpts,scale/pad,fps,filters,fade      -> [vI]   per timeline segment
//! [vA][vB]... concat (base layer only, N >= 2)       -> [vbase]
//! [cur][vL] overlay (upper layers, timed)            -> [ovK]
//! [cur] drawtext (one per overlay, timed)            -> [txtK]
//! [k:a] atrim,asetpts,atempo,volume,afade,adelay     -> [aJ]   per audio track
//! [a0][a1]... amix,apad,atrim | anullsrc,atrim       -> [aout]
//! ```
//!
//! Compilation is pure: the same plan and output path always yield the same
//! argument list.

use std::collections::HashMap;

use rgate_models::{overlay_syntax_issues, EngineId, ExecutionPlan, Quality, TimelineSegment};

use crate::command::{CompiledCommand, FfmpegCommand, FFMPEG_PROGRAM};
use crate::encoding::EncodingConfig;
use crate::error::{MediaError, MediaResult};
use crate::filters::{atempo_chain, drawtext, enable_window, fit_frame, number, secs, video_filter};

const AUDIO_FORMAT: &str = "aformat=sample_fmts=fltp:sample_rates=48000:channel_layouts=stereo";

/// Compile `plan` for `engine`, writing to `output_path`.
///
/// Only engines with an FFmpeg-class command have a compiler; `plan_export`
/// compiles the same command so it can be handed back for manual execution.
pub fn compile(plan: &ExecutionPlan, engine: EngineId, output_path: &str) -> MediaResult<CompiledCommand> {
    match engine {
        EngineId::ServerFfmpeg | EngineId::PlanExport => compile_ffmpeg(plan, output_path),
        EngineId::Webcodecs | EngineId::Cloudinary => Err(MediaError::UnsupportedEngine(engine)),
    }
}

/// Assigns `-i` indices to distinct assets in first-use order.
struct Inputs<'a> {
    order: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
}

impl<'a> Inputs<'a> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, asset: &'a str) -> usize {
        if let Some(i) = self.index.get(asset) {
            return *i;
        }
        let i = self.order.len();
        self.order.push(asset);
        self.index.insert(asset, i);
        i
    }
}

fn compile_ffmpeg(plan: &ExecutionPlan, output_path: &str) -> MediaResult<CompiledCommand> {
    let format = &plan.output_format;
    let total_ms = plan.output_duration_ms();
    if total_ms <= 0 {
        return Err(MediaError::invalid_plan("plan has no base-layer duration"));
    }

    let mut inputs = Inputs::new();
    let mut nodes: Vec<String> = Vec::new();

    // Video: one chain per segment
    let mut base_labels = Vec::new();
    let mut layer_labels: Vec<(&TimelineSegment, String)> = Vec::new();
    for (i, segment) in plan.timeline.iter().enumerate() {
        let asset = plan
            .segment_asset(segment)
            .ok_or_else(|| MediaError::invalid_plan(format!("segment '{}' has no asset", segment.segment_id)))?;
        let input = inputs.add(asset);
        let label = format!("v{}", i);
        nodes.push(format!("[{}:v]{}[{}]", input, segment_chain(segment, format.width, format.height, format.fps), label));

        if segment.is_base_layer() {
            base_labels.push(label);
        } else {
            layer_labels.push((segment, label));
        }
    }

    let mut video = match base_labels.len() {
        0 => return Err(MediaError::invalid_plan("plan has no base-layer segment")),
        1 => base_labels[0].clone(),
        n => {
            let joined: String = base_labels.iter().map(|l| format!("[{}]", l)).collect();
            nodes.push(format!("{}concat=n={}:v=1:a=0[vbase]", joined, n));
            "vbase".to_string()
        }
    };

    // Upper layers composite in (layer, timeline) order
    layer_labels.sort_by_key(|(segment, _)| segment.layer);
    for (k, (segment, label)) in layer_labels.iter().enumerate() {
        let out = format!("ov{}", k);
        nodes.push(format!(
            "[{}][{}]overlay=eof_action=pass:{}[{}]",
            video,
            label,
            enable_window(segment.timeline_start_ms, segment.timeline_end_ms),
            out
        ));
        video = out;
    }

    let mut overlays: Vec<_> = plan.text_overlays.iter().collect();
    overlays.sort_by_key(|o| o.timeline_start_ms);
    for (k, overlay) in overlays.into_iter().enumerate() {
        if let Some(issue) = overlay_syntax_issues(overlay).into_iter().next() {
            return Err(MediaError::invalid_plan(format!(
                "text overlay '{}' {}: {}",
                overlay.text_id, issue.path, issue.message
            )));
        }
        let out = format!("txt{}", k);
        nodes.push(format!("[{}]{}[{}]", video, drawtext(overlay), out));
        video = out;
    }

    // Audio: declared tracks only
    let mut audio_labels = Vec::new();
    for (j, track) in plan.audio_tracks.iter().enumerate() {
        let asset = plan
            .audio_asset(track)
            .ok_or_else(|| MediaError::invalid_plan(format!("audio track '{}' has no asset", track.audio_id)))?;
        let input = inputs.add(asset);

        let mut chain = vec![
            format!("atrim=start={}:end={}", secs(track.trim_start_ms), secs(track.trim_end_ms)),
            "asetpts=PTS-STARTPTS".to_string(),
            AUDIO_FORMAT.to_string(),
        ];
        chain.extend(atempo_chain(track.speed_multiplier));
        chain.push(format!("volume={}", number(track.volume)));
        let duration = track.output_duration_ms();
        if track.fade_in_ms > 0 {
            chain.push(format!("afade=t=in:st=0:d={}", secs(track.fade_in_ms)));
        }
        if track.fade_out_ms > 0 {
            chain.push(format!(
                "afade=t=out:st={}:d={}",
                secs((duration - track.fade_out_ms).max(0)),
                secs(track.fade_out_ms)
            ));
        }
        if track.timeline_start_ms > 0 {
            chain.push(format!("adelay={}:all=1", track.timeline_start_ms));
        }

        let label = format!("a{}", j);
        nodes.push(format!("[{}:a]{}[{}]", input, chain.join(","), label));
        audio_labels.push(label);
    }

    if audio_labels.is_empty() {
        nodes.push(format!(
            "anullsrc=channel_layout=stereo:sample_rate=48000,atrim=end={}[aout]",
            secs(total_ms)
        ));
    } else {
        let joined: String = audio_labels.iter().map(|l| format!("[{}]", l)).collect();
        nodes.push(format!(
            "{}amix=inputs={}:duration=longest:dropout_transition=0:normalize=0,apad,atrim=end={},asetpts=PTS-STARTPTS[aout]",
            joined,
            audio_labels.len(),
            secs(total_ms)
        ));
    }

    let graph = nodes.join(";");
    let quality = format.quality.unwrap_or(Quality::Medium);
    let encoding = EncodingConfig::for_output(format, quality);

    let mut cmd = FfmpegCommand::new(output_path);
    for asset in &inputs.order {
        cmd = cmd.input(*asset);
    }
    let cmd = cmd
        .filter_complex(graph.clone())
        .map(format!("[{}]", video))
        .map("[aout]")
        .output_args(encoding.to_ffmpeg_args())
        .output_args(["-t".to_string(), secs(total_ms)]);

    Ok(CompiledCommand {
        program: FFMPEG_PROGRAM.to_string(),
        args: cmd.build_args(),
        filter_graph: graph,
        total_duration_ms: total_ms,
    })
}

/// trim -> retime -> fit -> fps -> effects -> fade-in.
fn segment_chain(segment: &TimelineSegment, width: u32, height: u32, fps: u32) -> String {
    let mut chain = vec![format!(
        "trim=start={}:end={}",
        secs(segment.trim_start_ms),
        secs(segment.trim_end_ms)
    )];

    let retime = if segment.changes_speed() {
        format!("(PTS-STARTPTS)/{}", number(segment.speed_multiplier))
    } else {
        "PTS-STARTPTS".to_string()
    };
    // Upper layers are shifted onto the timeline so overlay can line them up
    let (retime, fade_start_ms) = if segment.is_base_layer() {
        (retime, 0)
    } else {
        (
            format!("{}+{}/TB", retime, secs(segment.timeline_start_ms)),
            segment.timeline_start_ms,
        )
    };
    chain.push(format!("setpts={}", retime));

    chain.push(fit_frame(width, height));
    chain.push(format!("fps={}", fps));
    chain.extend(segment.filters.iter().map(video_filter));

    if let Some(transition) = &segment.transition_in {
        chain.push(format!(
            "fade=t=in:st={}:d={}",
            secs(fade_start_ms),
            secs(transition.duration_ms)
        ));
    }

    chain.join(",")
}
