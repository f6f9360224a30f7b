mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, QueueCommand, ResolutionArg};
use tokio_util::sync::CancellationToken;
use vf_core::config::Config;
use vf_core::{Category, QueueName, Rendition, VideoId};
use vf_db::models::{NewUser, NewVideo, Video};
use vf_server::context::AppContext;
use vf_server::queue::JobPayload;
use vf_server::worker::WorkerOptions;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "videoflix=trace,vf_server=trace,vf_av=trace,vf_db=debug,vf_core=debug,tower_http=debug"
                .to_string()
        } else {
            "videoflix=debug,vf_server=debug,vf_av=debug,vf_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = Config::load_or_default(config_path);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(
                "Starting Videoflix on {}:{}",
                config.server.host,
                config.server.port
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(vf_server::start(config))?;
            Ok(())
        }
        Commands::Worker {
            queues,
            workers,
            burst,
        } => {
            let ctx = load_context(config_path)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_worker_command(ctx, queues, workers, burst))
        }
        Commands::CreateHls {
            video_id,
            resolution,
            force,
        } => {
            let ctx = load_context(config_path)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(create_hls(&ctx, video_id.map(VideoId::from), resolution, force))
        }
        Commands::GenerateThumbnails { video_id, force } => {
            let ctx = load_context(config_path)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(generate_thumbnails(&ctx, video_id.map(VideoId::from), force))
        }
        Commands::SeedVideos => seed_videos(&load_context(config_path)?),
        Commands::CreateSuperuser { email, password } => {
            create_superuser(&load_context(config_path)?, &email, &password)
        }
        Commands::Queue { action } => manage_queue(&load_context(config_path)?, action),
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("videoflix {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_context(config_path: Option<&Path>) -> Result<AppContext> {
    let config = Config::load_or_default(config_path);
    vf_server::build_context(config).context("Failed to initialize application")
}

async fn run_worker_command(
    ctx: AppContext,
    queues: Vec<QueueName>,
    workers: usize,
    burst: bool,
) -> Result<()> {
    let names = queues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    println!("Starting {workers} worker(s) for queues: {names}");
    if burst {
        println!("Running workers in burst mode...");
    } else {
        println!("Starting workers (press Ctrl+C to stop)...");
    }

    let options = WorkerOptions {
        queues,
        count: workers.max(1),
        burst,
        poll_interval: std::time::Duration::from_millis(ctx.config.worker.poll_interval_ms),
    };

    let cancel = CancellationToken::new();
    let signal = tokio::spawn(vf_server::shutdown_signal(cancel.clone()));
    let processed = vf_server::worker::run_workers(ctx, options, cancel.clone()).await;
    cancel.cancel();
    let _ = signal.await;

    println!("Workers stopped, {processed} job(s) processed");
    Ok(())
}

async fn create_hls(
    ctx: &AppContext,
    video_id: Option<VideoId>,
    resolution: ResolutionArg,
    force: bool,
) -> Result<()> {
    let videos = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        match video_id {
            Some(id) => match vf_db::queries::videos::get_video(&conn, id)? {
                Some(video) => vec![video],
                None => anyhow::bail!("Video with ID {id} not found"),
            },
            None => {
                let videos = vf_db::queries::videos::list_videos_with_files(&conn)?;
                println!("Creating HLS renditions for {} videos...", videos.len());
                videos
            }
        }
    };

    let renditions = resolution.renditions();
    for video in &videos {
        create_hls_for_video(ctx, video, &renditions, force).await;
    }
    Ok(())
}

async fn create_hls_for_video(ctx: &AppContext, video: &Video, renditions: &[Rendition], force: bool) {
    let Some(file) = video.file() else {
        println!("⚠ Video \"{}\" has no video file, skipping", video.title);
        return;
    };
    let input = match vf_av::layout::media_file(ctx.media_root(), file) {
        Ok(input) => input,
        Err(e) => {
            println!("✗ Video \"{}\": {e}, skipping", video.title);
            return;
        }
    };
    println!("Processing video \"{}\" (ID: {})...", video.title, video.id);

    let mut created = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for &rendition in renditions {
        let output = vf_av::layout::rendition_dir(ctx.media_root(), video.id, rendition);
        if !force && vf_av::get_hls_segments(&output).is_some() {
            println!("   {rendition}: already exists, skipping");
            skipped += 1;
            continue;
        }
        if force && output.exists() {
            if let Err(e) = std::fs::remove_dir_all(&output) {
                tracing::warn!("Failed to remove {}: {e}", output.display());
            }
        }

        match vf_av::create_hls_stream(&ctx.tools, &input, &output, rendition, &ctx.config.transcode)
            .await
        {
            Ok(stream) => {
                println!("✓  {rendition}: {} segments", stream.segment_count());
                created += 1;
            }
            Err(e) => {
                println!("✗  {rendition}: {e}");
                failed += 1;
            }
        }
    }

    if failed == 0 {
        println!(
            "✓ Video \"{}\": {created} created, {skipped} already present",
            video.title
        );
    } else {
        println!(
            "⚠ Video \"{}\": {created} created, {failed} failed",
            video.title
        );
    }
}

async fn generate_thumbnails(ctx: &AppContext, video_id: Option<VideoId>, force: bool) -> Result<()> {
    let videos: Vec<Video> = {
        let conn = vf_db::pool::get_conn(&ctx.db)?;
        match video_id {
            Some(id) => match vf_db::queries::videos::get_video(&conn, id)? {
                Some(video) => vec![video],
                None => anyhow::bail!("Video with ID {id} not found"),
            },
            None if force => {
                println!("Generating thumbnails for ALL videos (--force)");
                vf_db::queries::videos::list_videos_with_files(&conn)?
            }
            None => {
                println!("Generating thumbnails for videos without one");
                vf_db::queries::videos::list_videos_with_files(&conn)?
                    .into_iter()
                    .filter(|v| {
                        v.thumbnail.as_deref().map_or(true, str::is_empty)
                            && v.thumbnail_url.as_deref().map_or(true, str::is_empty)
                    })
                    .collect()
            }
        }
    };

    if videos.is_empty() {
        println!("No videos need a thumbnail");
        return Ok(());
    }
    println!("Processing {} videos...", videos.len());

    let mut ok = 0;
    let mut failed = 0;
    for video in &videos {
        let payload = JobPayload::GenerateThumbnail {
            video_id: video.id,
            force,
        };
        match vf_server::worker::execute(ctx, &payload).await {
            Ok(result) => {
                println!("✓ \"{}\": {result}", video.title);
                ok += 1;
            }
            Err(e) => {
                println!("✗ \"{}\": {e}", video.title);
                failed += 1;
            }
        }
    }

    println!("\nDone: {ok} succeeded, {failed} failed");
    Ok(())
}

/// Demo catalog rows: title, description, category, thumbnail URL, duration in seconds.
const SEED_VIDEOS: &[(&str, &str, &str, &str, i64)] = &[
    (
        "The Matrix",
        "A computer programmer discovers that reality as he knows it is a simulation.",
        "sci-fi",
        "https://example.com/thumbnails/matrix.jpg",
        8160,
    ),
    (
        "Inception",
        "A thief who steals information from the subconscious of his targets.",
        "sci-fi",
        "https://example.com/thumbnails/inception.jpg",
        8880,
    ),
    (
        "The Dark Knight",
        "Batman fights the Joker in Gotham City.",
        "action",
        "https://example.com/thumbnails/dark-knight.jpg",
        9120,
    ),
    (
        "Pulp Fiction",
        "Intertwined stories of gangsters in Los Angeles.",
        "crime",
        "https://example.com/thumbnails/pulp-fiction.jpg",
        9240,
    ),
    (
        "Forrest Gump",
        "A man with a low IQ lives through key moments of American history.",
        "drama",
        "https://example.com/thumbnails/forrest-gump.jpg",
        8520,
    ),
];

fn seed_videos(ctx: &AppContext) -> Result<()> {
    let conn = vf_db::pool::get_conn(&ctx.db)?;
    let mut created = 0;

    for &(title, description, category, thumbnail_url, duration) in SEED_VIDEOS {
        if vf_db::queries::videos::get_video_by_title(&conn, title)?.is_some() {
            println!("⚠ Video \"{title}\" already exists");
            continue;
        }
        let new = NewVideo {
            title: title.to_string(),
            description: description.to_string(),
            category: Category::parse_lossy(category),
            thumbnail_url: Some(thumbnail_url.to_string()),
            duration: Some(duration),
            ..Default::default()
        };
        vf_db::queries::videos::create_video(&conn, &new)?;
        println!("✓ Created video \"{title}\"");
        created += 1;
    }

    ctx.video_cache.invalidate();
    println!("{created} new videos created");
    Ok(())
}

fn create_superuser(ctx: &AppContext, email: &str, password: &str) -> Result<()> {
    vf_server::accounts::validate_email(email)?;
    let hash = vf_server::accounts::hash_password(password, ctx.config.auth.bcrypt_cost)?;
    let conn = vf_db::pool::get_conn(&ctx.db)?;

    if let Some(user) = vf_db::queries::users::get_user_by_email(&conn, email)? {
        vf_db::queries::users::promote_superuser(&conn, user.id)?;
        vf_db::queries::users::update_password(&conn, user.id, &hash)?;
        println!("✓ Promoted {} (ID: {}) to superuser", user.email, user.id);
        return Ok(());
    }

    let base = vf_server::accounts::username_base(email);
    let username = vf_db::queries::users::unique_username(&conn, &base)?;
    let user = vf_db::queries::users::create_user(
        &conn,
        &NewUser {
            email,
            username: Some(username.as_str()),
            password_hash: &hash,
            is_active: true,
            is_staff: true,
            is_superuser: true,
        },
    )?;
    println!("✓ Superuser {} created (ID: {})", user.email, user.id);
    Ok(())
}

fn manage_queue(ctx: &AppContext, action: QueueCommand) -> Result<()> {
    match action {
        QueueCommand::Stats => {
            let stats = vf_server::queue::queue_stats(&ctx.db)?;
            for (name, snapshot) in &stats {
                println!("{name:<8} {}", snapshot.count);
            }
        }
        QueueCommand::Clear => {
            let removed = vf_server::queue::clear_all_queues(&ctx.db)?;
            println!("✓ All queues cleared ({removed} jobs removed)");
        }
        QueueCommand::Retry => {
            let requeued = vf_server::queue::retry_failed_jobs(&ctx.db)?;
            println!("✓ {requeued} failed jobs requeued");
        }
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = vf_av::ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. HLS packaging and thumbnails need ffmpeg.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file given; validating defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Media root: {}", config.server.media_root.display());
    println!("  Protect media: {}", config.auth.protect_media);
    println!(
        "  Embedded workers: {} ({} worker(s))",
        config.worker.embedded, config.worker.count
    );

    for warning in config.validate() {
        println!("⚠ {warning}");
    }
    Ok(())
}
