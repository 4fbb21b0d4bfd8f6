use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Quat, Vec2, Vec3};
use serde::Serialize;
use stagecraft_common::{RenderSettings, Transform};
use stagecraft_render::{Camera, ColorMode, FrameRenderer, FrameStats, MeshData};
use stagecraft_render_gl::{GlContext, GlRenderer, HeadlessDevice, Shader, glsl};
use stagecraft_scene::{
    Actor, LayerActors, LightComponent, MeshComponent, MeshShellComponent, SpriteComponent, Stage,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagecraft-cli", about = "Headless tooling for the stagecraft renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Print effective render settings
    Settings {
        /// YAML settings file; defaults are used when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Render one demo frame on the headless device and report what it did
    Frame {
        /// Number of additive sprites in the demo scene
        #[arg(short, long, default_value = "4")]
        sprites: usize,
        /// Stream opaque draws while traversal runs
        #[arg(long)]
        overlap: bool,
        /// Depth-sort the blending phase
        #[arg(long)]
        sorting: bool,
        /// Print stats as JSON
        #[arg(long)]
        json: bool,
        /// YAML settings file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Build every built-in program and report readiness
    Shaders,
}

#[derive(Serialize)]
struct LayerReport {
    layer: String,
    stats: FrameStats,
}

fn load_settings(file: Option<&PathBuf>) -> anyhow::Result<RenderSettings> {
    let settings = match file {
        Some(path) => RenderSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => RenderSettings::default(),
    };
    Ok(settings.sanitized())
}

fn demo_stage(
    renderer: &mut GlRenderer<HeadlessDevice>,
    sprites: usize,
    sorting: bool,
) -> anyhow::Result<Stage> {
    let cube_data = Arc::new(MeshData::cube());
    let cube = renderer.create_mesh(&cube_data, true)?;
    let quad = renderer.create_mesh(&MeshData::quad(), false)?;
    let checker = renderer.create_texture_rgba8(
        2,
        2,
        &[
            255, 255, 255, 255, 40, 40, 40, 255, //
            40, 40, 40, 255, 255, 255, 255, 255,
        ],
    )?;
    let phong = renderer.phong_shader();
    let sprite = renderer.sprite_shader();

    let mut camera = Camera::default();
    camera.position = Vec3::new(0.0, 4.0, 12.0);
    camera.look_at(Vec3::ZERO);
    let mut layer = LayerActors::new("world").with_camera(camera);
    layer.sorting = sorting;
    layer.apply_settings(renderer.settings());

    layer.add_actor(
        Actor::new("floor")
            .with_transform(Transform {
                position: Vec3::new(0.0, -0.55, 0.0),
                scale: Vec3::new(20.0, 0.1, 20.0),
                ..Transform::default()
            })
            .with_component(
                MeshComponent::new(phong, cube)
                    .with_texture(checker)
                    .casting_shadows(false),
            ),
    );
    for i in 0..3 {
        let x = (i as f32 - 1.0) * 2.5;
        layer.add_actor(
            Actor::new(format!("crate{i}"))
                .with_transform(Transform {
                    position: Vec3::new(x, 0.0, 0.0),
                    rotation: Quat::from_rotation_y(i as f32 * 0.4),
                    ..Transform::default()
                })
                .with_component(MeshComponent::new(phong, cube).with_geometry(cube_data.clone())),
        );
    }
    layer.add_actor(
        Actor::new("shield")
            .with_transform(Transform::from_position(Vec3::new(2.5, 0.0, 0.0)))
            .with_component(MeshShellComponent::new(sprite, cube, 0.15)),
    );
    for i in 0..sprites {
        let x = i as f32 - sprites as f32 * 0.5;
        layer.add_actor(
            Actor::new(format!("spark{i}"))
                .with_transform(Transform::from_position(Vec3::new(x, 2.0, 1.0 + i as f32 * 0.3)))
                .with_component(
                    SpriteComponent::new(sprite, quad, None)
                        .with_size(Vec2::splat(0.6))
                        .with_color_mode(ColorMode::Addition),
                ),
        );
    }
    layer.add_actor(
        Actor::new("sun").with_component(
            LightComponent::sun(Vec3::new(-0.4, -1.0, -0.3), Vec3::new(1.0, 0.95, 0.85))
                .with_affect_distance(15.0)
                .casting_shadows(true),
        ),
    );
    layer.add_actor(
        Actor::new("lamp")
            .with_transform(Transform::from_position(Vec3::new(0.0, 1.5, 2.0)))
            .with_component(
                LightComponent::omni(Vec3::new(1.0, 0.6, 0.2), 6.0).with_intensity(2.0),
            ),
    );

    let mut stage = Stage::new();
    stage.add_layer(layer)?;
    Ok(stage)
}

fn run_frame(
    sprites: usize,
    overlap: bool,
    sorting: bool,
    json: bool,
    file: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let mut settings = load_settings(file)?;
    settings.overlap_traversal |= overlap;

    let mut renderer = GlRenderer::new(HeadlessDevice::new(), settings)?;
    let mut target = renderer.create_target(640, 360)?;
    let mut stage = demo_stage(&mut renderer, sprites, sorting)?;

    let frames = stage.render(&mut renderer, &mut target)?;
    renderer.present_to_screen(&target, 640, 360)?;

    if json {
        let reports: Vec<LayerReport> = frames
            .into_iter()
            .map(|(layer, stats)| LayerReport { layer, stats })
            .collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for (layer, stats) in &frames {
        println!("layer `{layer}`");
        let passes: Vec<String> = stats.passes.iter().map(|p| format!("{p:?}")).collect();
        println!("  passes:   {}", passes.join(" -> "));
        println!(
            "  draws:    main={} blending={} shadow={} skipped={}",
            stats.main_draws, stats.blending_draws, stats.shadow_draws, stats.skipped_draws
        );
        println!("  lights:   {}", stats.light_passes);
        println!("  debug:    {} lines", stats.debug_lines);
    }
    println!("device draw calls: {}", renderer.device().draw_count());
    Ok(())
}

fn run_shaders() -> anyhow::Result<()> {
    let mut gl = GlContext::new(HeadlessDevice::new());
    let mut programs: Vec<Shader> = glsl::PIPELINE.iter().map(Shader::from_source).collect();
    programs.push(Shader::phong("builtin/phong", glsl::PHONG_FRAGMENT));
    programs.push(Shader::phong("builtin/sprite", glsl::SPRITE_FRAGMENT));

    let mut failed = 0;
    for shader in &mut programs {
        let ready = shader.build(&mut gl);
        if !ready {
            failed += 1;
        }
        println!(
            "{:<28} {}  samplers={:?}",
            shader.name(),
            if ready { "ready " } else { "FAILED" },
            shader.slots()
        );
        shader.destroy(&mut gl);
    }
    anyhow::ensure!(failed == 0, "{failed} built-in program(s) failed to build");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Info => {
            println!("stagecraft-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", stagecraft_common::crate_info());
            println!("render: {}", stagecraft_render::crate_info());
            println!("render-gl: {}", stagecraft_render_gl::crate_info());
            println!("scene: {}", stagecraft_scene::crate_info());
        }
        Commands::Settings { file } => {
            let settings = load_settings(file.as_ref())?;
            print!("{}", settings.to_yaml_string()?);
            println!(
                "# shadow map: {0}x{0}",
                settings.quality.shadow_map_size()
            );
        }
        Commands::Frame {
            sprites,
            overlap,
            sorting,
            json,
            file,
        } => run_frame(sprites, overlap, sorting, json, file.as_ref())?,
        Commands::Shaders => run_shaders()?,
    }

    Ok(())
}
