use crate::config::Config;
use crate::media::ToolLocator;
use console::style;
use dialoguer::Input;
use std::path::PathBuf;

/// Ask for the source video when it was not given on the command line.
pub fn prompt_input_path() -> anyhow::Result<PathBuf> {
    let raw: String = Input::new()
        .with_prompt("Enter the path to the video file")
        .validate_with(|input: &String| -> Result<(), String> {
            let path = PathBuf::from(clean_path(input));
            if path.is_file() {
                Ok(())
            } else {
                Err(format!("File not found: {}", path.display()))
            }
        })
        .interact_text()?;

    Ok(PathBuf::from(clean_path(&raw)))
}

/// Drag-and-drop into a terminal often wraps paths in quotes.
fn clean_path(input: &str) -> &str {
    input.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Print which backends this environment can use.
pub fn print_backend_status(config: &Config, library_available: bool) -> bool {
    println!("\n{}", style("═══ Backends ═══").bold());

    let ffmpeg = ToolLocator::ffmpeg(config).locate();
    let ffprobe = ToolLocator::ffprobe(config).locate();

    print_tool("ffmpeg", ffmpeg.as_ref().map(|p| p.display().to_string()));
    print_tool("ffprobe", ffprobe.as_ref().map(|p| p.display().to_string()));
    print_tool(
        "library",
        library_available.then(|| "libav (in-process)".to_string()),
    );

    if ffmpeg.is_some() && ffprobe.is_none() {
        println!(
            "  {} ffprobe missing: durations cannot be probed for the ffmpeg method",
            style("!").yellow()
        );
    }
    println!();

    ffmpeg.is_some() || library_available
}

fn print_tool(name: &str, found: Option<String>) {
    match found {
        Some(detail) => println!("  {} {:<8} {}", style("✓").green(), name, style(detail).cyan()),
        None => println!("  {} {:<8} {}", style("✗").red(), name, style("not available").dim()),
    }
}
