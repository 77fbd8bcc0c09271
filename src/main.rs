//! wordstream - ebook to RSVP word stream

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};

use wordstream::markup::escape_html;
use wordstream::{ParseOptions, ParsedBook, Pipeline, TimingConfig, file_key, split_at_orp};

#[derive(Parser)]
#[command(name = "wordstream")]
#[command(version, about = "Ebook to RSVP word stream", long_about = None)]
#[command(after_help = "EXAMPLES:
    wordstream info book.epub           Show metadata and counts
    wordstream words book.mobi --wpm 400  List words with ORP and timing
    wordstream preview book.fb2 -p 3    Render page 3 as HTML")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Words per page before a page closes
    #[arg(long, global = true, default_value_t = 250)]
    page_words: usize,

    /// Pages shorter than this are merged
    #[arg(long, global = true, default_value_t = 20)]
    min_page_words: usize,

    /// Skip embedded images
    #[arg(long, global = true)]
    no_images: bool,

    /// More log output (repeat for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Show metadata, counts, chapters and warnings
    Info {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
    /// Print every word with its ORP split and display duration
    Words {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Reading speed in words per minute
        #[arg(long, default_value_t = 300.0)]
        wpm: f64,

        /// Only print this page
        #[arg(short, long)]
        page: Option<usize>,
    },
    /// Dump the parsed book as JSON
    Json {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(long)]
        pretty: bool,
    },
    /// Render one page as a standalone HTML document
    Preview {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Zero-based page number
        #[arg(short, long, default_value_t = 0)]
        page: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let options = ParseOptions::new()
        .with_target_words_per_page(cli.page_words)
        .with_min_page_words(cli.min_page_words)
        .with_images(!cli.no_images);
    let pipeline = Pipeline::with_options(options);

    let result = match &cli.command {
        Command::Info { input } => show_info(&pipeline, input),
        Command::Words { input, wpm, page } => show_words(&pipeline, input, *wpm, *page),
        Command::Json { input, pretty } => dump_json(&pipeline, input, *pretty),
        Command::Preview { input, page } => preview(&pipeline, input, *page),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn open(pipeline: &Pipeline, path: &Path) -> Result<ParsedBook, String> {
    pipeline.parse_file(path).map_err(|e| e.to_string())
}

fn show_info(pipeline: &Pipeline, path: &Path) -> Result<(), String> {
    let mut book = open(pipeline, path)?;
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    println!("File: {}", path.display());
    println!("Format: {}", book.format);
    if let Some(ref title) = book.metadata.title {
        println!("Title: {title}");
    }
    if let Some(ref author) = book.metadata.author {
        println!("Author: {author}");
    }
    if let Some(ref language) = book.metadata.language {
        println!("Language: {language}");
    }
    println!("Words: {}", book.document.total_words());
    println!("Paragraphs: {}", book.document.total_paragraphs());
    println!("Pages: {}", book.document.total_pages());
    println!("Progress key: {}", file_key(&name, size));

    println!("Chapters: {}", book.chapter_starts.len());
    for chapter in book.chapters.iter().filter(|c| !c.placeholder) {
        println!(
            "  {:>7}-{:<7} {}",
            chapter.word_start, chapter.word_end, chapter.title
        );
    }
    println!("Images: {}", book.resources.live());

    if !book.warnings.is_empty() {
        println!("Warnings:");
        for warning in &book.warnings {
            println!("  {warning}");
        }
    }

    book.release_resources();
    Ok(())
}

fn show_words(
    pipeline: &Pipeline,
    path: &Path,
    wpm: f64,
    page: Option<usize>,
) -> Result<(), String> {
    let mut book = open(pipeline, path)?;
    let timing = TimingConfig::default().with_wpm(wpm);

    let range = match page {
        Some(page) => book.document.page_range(page),
        None => Some((0, book.document.total_words().saturating_sub(1))),
    };
    let Some((start, end)) = range else {
        let pages = book.document.total_pages();
        book.release_resources();
        return Err(format!("page {} out of range (0..{pages})", page.unwrap_or_default()));
    };

    for (index, word) in book.document.words[start..=end].iter().enumerate() {
        let (before, pivot, after) = split_at_orp(&word.text);
        println!(
            "{:>7} {:>5}ms p{:<4} {before}[{pivot}]{after}",
            start + index,
            timing.duration(&word.text),
            word.paragraph_index
        );
    }

    book.release_resources();
    Ok(())
}

fn dump_json(pipeline: &Pipeline, path: &Path, pretty: bool) -> Result<(), String> {
    let mut book = open(pipeline, path)?;
    let json = if pretty {
        serde_json::to_string_pretty(&book)
    } else {
        serde_json::to_string(&book)
    }
    .map_err(|e| e.to_string())?;
    println!("{json}");
    book.release_resources();
    Ok(())
}

fn preview(pipeline: &Pipeline, path: &Path, page: usize) -> Result<(), String> {
    let mut book = open(pipeline, path)?;
    let Some((start, end)) = book.document.page_range(page) else {
        let pages = book.document.total_pages();
        book.release_resources();
        return Err(format!("page {page} out of range (0..{pages})"));
    };

    let title = book.metadata.title.clone().unwrap_or_default();
    let mut body = String::new();
    for section in book.sections_for_page(page) {
        let mut markup = section.markup.clone();
        for (src, &handle) in &section.resources {
            if let Some(resource) = book.resource(handle) {
                let data_uri = format!(
                    "src=\"data:{};base64,{}\"",
                    resource.media_type,
                    STANDARD.encode(&resource.data)
                );
                markup = markup.replace(&format!("data-src=\"{}\"", escape_html(src)), &data_uri);
            }
        }
        body.push_str(&format!(
            "<section data-ordinal=\"{}\">\n{markup}\n</section>\n",
            section.ordinal
        ));
    }

    println!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"/><title>{}</title></head>\n\
         <body data-page=\"{page}\" data-word-start=\"{start}\" data-word-end=\"{end}\">\n\
         {body}</body></html>",
        escape_html(&title)
    );

    book.release_resources();
    Ok(())
}
