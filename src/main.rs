//! Main entry point for the hpfw CLI application.
//!
//! This binary provides a command-line interface for inspecting and
//! extracting HP firmware bundles from both local filesystem and remote
//! HTTP URLs.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hpfw::{
    Bundle, BundleExtractor, Cli, ExtractSummary, FileEntry, HttpRangeReader, LocalFileReader,
    PackageReader, ReadAt,
};

/// Application entry point.
///
/// Parses command-line arguments and dispatches to the appropriate handler
/// based on whether the input is a local file or HTTP URL.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.is_http_url() {
        // Handle remote bundles via HTTP Range requests
        let reader = HttpRangeReader::new(cli.file.clone()).await?;
        let transferred_before = reader.transferred_bytes();
        let reader = Arc::new(reader);

        process_file(reader.clone(), &cli).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        // Handle local files
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.file))?);
        process_file(reader, &cli).await?;
    }

    Ok(())
}

/// Dispatch on container kind: a full bundle by default, a standalone
/// package file with `--pkg`.
async fn process_file<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    if cli.package {
        process_package(reader, cli).await
    } else {
        process_bundle(reader, cli).await
    }
}

/// Process a bundle based on CLI options.
///
/// Handles the listing, inspection, checksum-test, pipe, and extraction
/// modes in that priority order.
async fn process_bundle<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let extractor = BundleExtractor::new(reader);
    let bundle = extractor.read_bundle().await?;

    if cli.list || cli.verbose {
        return list_bundle(&extractor, &bundle, cli).await;
    }
    if cli.test {
        return test_bundle(&extractor, &bundle, cli).await;
    }
    if cli.pipe {
        return pipe_bundle(&extractor, &bundle, cli).await;
    }

    let dest = default_extract_dir(cli, &bundle.header.name);
    let opts = cli.extract_options();

    // Split mode: dump the raw package sub-containers and stop.
    if cli.split {
        let summary = extractor.extract_packages_to(&dest, &opts).await?;
        print_summary(&summary, cli);
        return Ok(());
    }

    // Fast path: no name filters means the whole bundle, one concurrent
    // task per package.
    if cli.names.is_empty() && cli.exclude.is_empty() {
        let summary = extractor.extract_to(&dest, &opts).await?;
        print_summary(&summary, cli);
        return Ok(());
    }

    // Selective extraction. Package names only exist inside the package
    // headers, so open each one and filter on the decoded name.
    let mut summary = ExtractSummary::default();
    for entry in &bundle.packages {
        let package = extractor.open_package(entry).await?;
        if !selected(package.name(), cli) {
            continue;
        }
        let dir = dest.join(package.name());
        let (files, bytes) = package.extract_to(&dir, &opts).await?;
        summary.packages += 1;
        summary.files += files;
        summary.bytes += bytes;
    }
    print_summary(&summary, cli);

    Ok(())
}

/// Process a standalone `.ipkg` package file (`--pkg`).
async fn process_package<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let package = PackageReader::open(reader, 0).await?;

    if cli.list {
        for entry in package.files() {
            println!("{}", entry.name);
        }
        return Ok(());
    }
    if cli.verbose {
        inspect_package(&package);
        return Ok(());
    }
    if cli.test {
        let (tested, failed) = verify_package_files(&package, cli.is_quiet()).await?;
        return report_test_result(tested, failed, cli);
    }
    if cli.pipe {
        for entry in package.files() {
            if pipe_selected(package.name(), &entry.name, cli) {
                package.extract_to_stdout(entry).await?;
            }
        }
        return Ok(());
    }

    let dest = default_extract_dir(cli, package.name());
    let (files, bytes) = package.extract_to(&dest, &cli.extract_options()).await?;
    print_summary(
        &ExtractSummary {
            packages: 1,
            files,
            bytes,
        },
        cli,
    );

    Ok(())
}

/// List bundle contents.
///
/// Simple format (`-l`) prints one `package/file` line per entry; verbose
/// format (`-v`) dumps the decoded headers and signature block.
async fn list_bundle<R: ReadAt + 'static>(
    extractor: &BundleExtractor<R>,
    bundle: &Bundle,
    cli: &Cli,
) -> Result<()> {
    if cli.verbose {
        inspect_bundle(bundle);
    }

    for entry in &bundle.packages {
        let package = extractor.open_package(entry).await?;
        if !selected(package.name(), cli) {
            continue;
        }
        if cli.verbose {
            println!();
            inspect_package(&package);
        } else {
            for file in package.files() {
                println!("{}/{}", package.name(), file.name);
            }
        }
    }

    Ok(())
}

/// Print the decoded bundle header and signature block.
fn inspect_bundle(bundle: &Bundle) {
    let header = &bundle.header;
    println!("Bundle: {}", header.name);
    println!("  Version:     {}", header.version);
    println!("  Release:     {}", header.release);
    println!("  Vendor:      {}", header.vendor);
    println!("  Date:        {}", header.date_code.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Model code:  {}", header.model_code);
    println!("  FutureSmart: {}", header.future_smart_version);
    println!("  Packages:    {}", bundle.packages.len());

    match &bundle.signature {
        Some(signature) => {
            println!("Signature:");
            println!("  Key:                {}", signature.key);
            println!("  Hash:               {}", signature.hash);
            println!("  Fingerprint length: {}", signature.fingerprint_length);
            println!("  Digest:             {}", signature.digest);
        }
        None => println!("Signature:   (none)"),
    }
}

/// Print a decoded package header and its file table.
fn inspect_package<R: ReadAt>(package: &PackageReader<R>) {
    let header = package.header();
    println!("Package: {} <{}>", header.name, header.uuid);
    println!("  Version:  {}", header.version);
    println!("  Release:  {}", header.release);
    println!("  Vendor:   {}", header.vendor);
    println!("  Date:     {}", header.date_code.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Comment:  {}", header.comment);
    println!("  {:>12}  {:>8}  Name", "Length", "CRC32");
    for entry in package.files() {
        println!(
            "  {:>12}  {:08x}  {}",
            entry.length, entry.checksum, entry.name
        );
    }
}

/// Recompute every file checksum in the bundle without extracting.
async fn test_bundle<R: ReadAt + 'static>(
    extractor: &BundleExtractor<R>,
    bundle: &Bundle,
    cli: &Cli,
) -> Result<()> {
    let mut tested = 0;
    let mut failed = 0;
    for entry in &bundle.packages {
        let package = extractor.open_package(entry).await?;
        if !selected(package.name(), cli) {
            continue;
        }
        let (t, f) = verify_package_files(&package, cli.is_quiet()).await?;
        tested += t;
        failed += f;
    }
    report_test_result(tested, failed, cli)
}

/// Verify each file entry's stored CRC32 against the data on disk.
///
/// Returns `(tested, failed)` counts.
async fn verify_package_files<R: ReadAt>(
    package: &PackageReader<R>,
    quiet: bool,
) -> Result<(usize, usize)> {
    let mut failed = 0;
    for entry in package.files() {
        let computed = package.checksum_file(entry).await?;
        if computed == entry.checksum {
            if !quiet {
                println!("    testing: {}/{}   OK", package.name(), entry.name);
            }
        } else {
            failed += 1;
            eprintln!(
                "    testing: {}/{}   BAD (stored {:08x}, computed {computed:08x})",
                package.name(),
                entry.name,
                entry.checksum
            );
        }
    }
    Ok((package.files().len(), failed))
}

fn report_test_result(tested: usize, failed: usize, cli: &Cli) -> Result<()> {
    if failed > 0 {
        bail!("{failed} of {tested} files failed checksum verification");
    }
    if !cli.is_quiet() {
        println!("No errors detected in {tested} files");
    }
    Ok(())
}

/// Stream matching file entries to stdout.
async fn pipe_bundle<R: ReadAt + 'static>(
    extractor: &BundleExtractor<R>,
    bundle: &Bundle,
    cli: &Cli,
) -> Result<()> {
    // Collect the matches first so single-file output stays clean of
    // separator headers.
    let mut matched: Vec<(PackageReader<R>, Vec<FileEntry>)> = Vec::new();
    for entry in &bundle.packages {
        let package = extractor.open_package(entry).await?;
        let files: Vec<FileEntry> = package
            .files()
            .iter()
            .filter(|f| pipe_selected(package.name(), &f.name, cli))
            .cloned()
            .collect();
        if !files.is_empty() {
            matched.push((package, files));
        }
    }

    let total: usize = matched.iter().map(|(_, files)| files.len()).sum();
    let show_filename = total > 1;

    for (package, files) in &matched {
        for entry in files {
            if show_filename {
                use tokio::io::AsyncWriteExt;
                let mut stdout = tokio::io::stdout();
                stdout
                    .write_all(format!("--- {}/{} ---\n", package.name(), entry.name).as_bytes())
                    .await?;
            }
            package.extract_to_stdout(entry).await?;
        }
    }

    Ok(())
}

/// Check a package name against the positional filters and exclusions.
fn selected(name: &str, cli: &Cli) -> bool {
    if !cli.names.is_empty() {
        let matches = cli.names.iter().any(|pattern| {
            if has_glob_chars(pattern) {
                glob_match(pattern, name)
            } else {
                name == *pattern
            }
        });
        if !matches {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| name.contains(x.as_str()) || glob_match(x, name))
}

/// Check a file entry against the positional filters in pipe mode, where
/// patterns name `package/file` paths or bare file names.
fn pipe_selected(package: &str, file: &str, cli: &Cli) -> bool {
    let path = format!("{package}/{file}");

    if cli
        .exclude
        .iter()
        .any(|x| path.contains(x.as_str()) || glob_match(x, &path))
    {
        return false;
    }
    if cli.names.is_empty() {
        return true;
    }

    cli.names.iter().any(|pattern| {
        if has_glob_chars(pattern) {
            glob_match(pattern, &path) || glob_match(pattern, file)
        } else {
            path == *pattern || file == *pattern
        }
    })
}

/// Determine the extraction target directory.
///
/// `-d` wins; otherwise the directory is named from the container's
/// header `name` field, falling back to the source file stem, and placed
/// next to a local bundle (or in the current directory for URLs).
fn default_extract_dir(cli: &Cli, container_name: &str) -> PathBuf {
    if let Some(dir) = &cli.extract_dir {
        return PathBuf::from(dir);
    }

    if cli.is_http_url() {
        let segment = cli
            .file
            .rsplit('/')
            .next()
            .and_then(|s| s.split('?').next())
            .unwrap_or_default();
        let stem = Path::new(segment)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty());
        let name = if container_name.is_empty() {
            stem.unwrap_or_else(|| "bundle".to_string())
        } else {
            container_name.to_string()
        };
        return PathBuf::from(name);
    }

    let path = Path::new(&cli.file);
    let dirname = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = if container_name.is_empty() {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "bundle".to_string())
    } else {
        container_name.to_string()
    };
    dirname.join(name)
}

fn print_summary(summary: &ExtractSummary, cli: &Cli) {
    if cli.is_very_quiet() {
        return;
    }
    println!(
        "Extracted {} packages, {} files ({})",
        summary.packages,
        summary.files,
        format_size(summary.bytes)
    );
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    /// Recursive helper using simple backtracking for `*` wildcards.
    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            // Both exhausted: match successful
            (None, None) => true,
            // Star matches zero or more characters
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            // Question mark matches exactly one character
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            // Literal character match
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            // No match
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
