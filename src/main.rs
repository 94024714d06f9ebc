use clap::{Parser, Subcommand};
use colored::Colorize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// chapnav - Adds previous/home/next navigation links to markdown chapters
#[derive(Parser)]
#[command(name = "chapnav")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path [default: .chapnav.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert navigation blocks into every chapter file (default)
    Apply {
        /// Directory holding the chapter files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Compute changes without writing any file
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report chapters that still lack navigation; exits non-zero if any do
    Check {
        /// Directory holding the chapter files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the chapter table
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

const DEFAULT_CONFIG: &str = ".chapnav.toml";
const DEFAULT_DIR: &str = "docs/chapters";

// Markers and link templates. Documents are Korean; the text must match byte for byte
// or the idempotency gates stop working on already-processed chapters.
const NAV_HEADING: &str = "## 📚 네비게이션";
const FOOTER_SENTINEL: &str = "🎉";
const SUMMARY_HEADING: &str = "## 📝 핵심 요약";
const NEXT_CHAPTER_PHRASE: &str = "다음 챕터";
const HOME_LINK: &str = "- **🏠 목차**: [전체 목차](./README.md)";

/// (file, title, previous file, next file)
type ChapterRow = (&'static str, &'static str, Option<&'static str>, Option<&'static str>);

#[rustfmt::skip]
const CHAPTERS: &[ChapterRow] = &[
    ("chapter-05-package-json.md", "Chapter 5: package.json - 프로젝트 설정과 의존성 관리", Some("chapter-04-react-intro.md"), Some("chapter-06-index-html.md")),
    ("chapter-06-index-html.md", "Chapter 6: public/index.html - React 앱의 진입점", Some("chapter-05-package-json.md"), Some("chapter-07-index-js.md")),
    ("chapter-07-index-js.md", "Chapter 7: src/index.js - React 애플리케이션 시작점", Some("chapter-06-index-html.md"), Some("chapter-08-app-js.md")),
    ("chapter-08-app-js.md", "Chapter 8: src/App.js - 메인 애플리케이션 컴포넌트", Some("chapter-07-index-js.md"), Some("chapter-09-todo-container.md")),
    ("chapter-09-todo-container.md", "Chapter 9: TodoContainer.js - 컨테이너 컴포넌트", Some("chapter-08-app-js.md"), Some("chapter-10-todo-input.md")),
    ("chapter-10-todo-input.md", "Chapter 10: TodoInput.js - 입력 컴포넌트", Some("chapter-09-todo-container.md"), Some("chapter-11-todo-list.md")),
    ("chapter-11-todo-list.md", "Chapter 11: TodoList.js - 목록 컴포넌트", Some("chapter-10-todo-input.md"), Some("chapter-12-todo-item.md")),
    ("chapter-12-todo-item.md", "Chapter 12: TodoItem.js - 개별 아이템 컴포넌트", Some("chapter-11-todo-list.md"), Some("chapter-13-todo-service.md")),
    ("chapter-13-todo-service.md", "Chapter 13: todoService/index.js - 서비스 레이어 구조", Some("chapter-12-todo-item.md"), Some("chapter-14-crud-create-read.md")),
    ("chapter-14-crud-create-read.md", "Chapter 14: CRUD 연산 - Create와 Read", Some("chapter-13-todo-service.md"), Some("chapter-15-crud-update-delete.md")),
    ("chapter-15-crud-update-delete.md", "Chapter 15: CRUD 연산 - Update와 Delete", Some("chapter-14-crud-create-read.md"), Some("chapter-16-server-database.md")),
    ("chapter-16-server-database.md", "Chapter 16: server.js와 database.json - 백엔드 서버", Some("chapter-15-crud-update-delete.md"), Some("chapter-17-jest-config.md")),
    ("chapter-17-jest-config.md", "Chapter 17: 테스팅 - jest.config.json과 테스트 작성", Some("chapter-16-server-database.md"), Some("chapter-18-build-deployment.md")),
    ("chapter-18-build-deployment.md", "Chapter 18: 빌드와 배포 - GitHub Pages", Some("chapter-17-jest-config.md"), Some("chapter-19-vercel-deployment.md")),
    ("chapter-19-vercel-deployment.md", "Chapter 19: Vercel 배포와 vercel.json 설정", Some("chapter-18-build-deployment.md"), Some("chapter-20-performance-optimization.md")),
    ("chapter-20-performance-optimization.md", "Chapter 20: 성능 최적화와 모범 사례", Some("chapter-19-vercel-deployment.md"), None),
];

fn main() {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Apply {
        dir: None,
        dry_run: false,
        json: false,
    });

    let result = load_config(cli.config.as_deref()).and_then(|config| match command {
        Commands::Apply { dir, dry_run, json } => {
            cmd_apply(&config, dir.as_deref(), dry_run, json, cli.quiet)
        }
        Commands::Check { dir, json } => cmd_check(&config, dir.as_deref(), json, cli.quiet),
        Commands::List { json } => cmd_list(&config, json),
    });

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

// ============================================================================
// Chapter index
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ChapterRecord {
    file: String,
    title: String,
    #[serde(default)]
    prev: Option<String>,
    #[serde(default)]
    next: Option<String>,
}

impl ChapterRecord {
    fn from_row(&(file, title, prev, next): &ChapterRow) -> Self {
        Self {
            file: file.to_string(),
            title: title.to_string(),
            prev: prev.map(str::to_string),
            next: next.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NavLink<'a> {
    file: &'a str,
    title: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Neighbors<'a> {
    prev: Option<NavLink<'a>>,
    next: Option<NavLink<'a>>,
}

/// Ordered, read-only chapter table.
#[derive(Debug, Clone)]
struct ChapterIndex {
    records: Vec<ChapterRecord>,
}

impl ChapterIndex {
    fn builtin() -> Self {
        Self::from_records(CHAPTERS.iter().map(ChapterRecord::from_row).collect())
    }

    fn from_records(records: Vec<ChapterRecord>) -> Self {
        Self { records }
    }

    fn iter(&self) -> impl Iterator<Item = &ChapterRecord> {
        self.records.iter()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn get(&self, file: &str) -> Option<&ChapterRecord> {
        self.records.iter().find(|r| r.file == file)
    }

    fn title_of(&self, file: &str) -> Option<&str> {
        self.get(file).map(|r| r.title.as_str())
    }

    /// Resolves both neighbors of `file`. A neighbor whose file is not in the table
    /// is dropped rather than reported.
    fn neighbors_of(&self, file: &str) -> Option<Neighbors<'_>> {
        let record = self.get(file)?;
        Some(Neighbors {
            prev: self.link_to(record.prev.as_deref()),
            next: self.link_to(record.next.as_deref()),
        })
    }

    fn link_to<'s>(&'s self, target: Option<&'s str>) -> Option<NavLink<'s>> {
        let target = target?;
        self.title_of(target).map(|title| NavLink { file: target, title })
    }

    fn validate(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for record in &self.records {
            if !seen.insert(record.file.as_str()) {
                issues.push(IntegrityIssue::DuplicateFile {
                    file: record.file.clone(),
                });
            }
        }

        for (i, record) in self.records.iter().enumerate() {
            for (direction, target) in [("prev", &record.prev), ("next", &record.next)] {
                let Some(target) = target else { continue };
                let Some(other) = self.get(target) else {
                    issues.push(IntegrityIssue::DanglingReference {
                        file: record.file.clone(),
                        direction,
                        target: target.clone(),
                    });
                    continue;
                };
                let back = if direction == "prev" { &other.next } else { &other.prev };
                if back.as_deref() != Some(record.file.as_str()) {
                    issues.push(IntegrityIssue::BrokenBackLink {
                        file: record.file.clone(),
                        target: target.clone(),
                    });
                }
            }

            // Chain ends must point outside the table, otherwise the chain loops.
            let ends = [
                (i == 0, "prev", &record.prev),
                (i + 1 == self.records.len(), "next", &record.next),
            ];
            for (is_end, direction, target) in ends {
                let Some(target) = target.as_deref().filter(|_| is_end) else { continue };
                if self.get(target).is_some() {
                    issues.push(IntegrityIssue::ClosedChain {
                        file: record.file.clone(),
                        direction,
                        target: target.to_string(),
                    });
                }
            }

            let expected = self.records.get(i + 1).map(|r| r.file.as_str());
            if let (Some(next), Some(expected)) = (record.next.as_deref(), expected) {
                if next != expected {
                    issues.push(IntegrityIssue::OutOfOrder {
                        file: record.file.clone(),
                        expected: expected.to_string(),
                        found: next.to_string(),
                    });
                }
            }
        }

        issues
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum IntegrityIssue {
    DuplicateFile { file: String },
    DanglingReference { file: String, direction: &'static str, target: String },
    BrokenBackLink { file: String, target: String },
    OutOfOrder { file: String, expected: String, found: String },
    ClosedChain { file: String, direction: &'static str, target: String },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateFile { file } => write!(f, "{} is listed more than once", file),
            Self::DanglingReference { file, direction, target } => {
                write!(f, "{}: {} points to unknown chapter {}", file, direction, target)
            }
            Self::BrokenBackLink { file, target } => {
                write!(f, "{}: {} does not link back", file, target)
            }
            Self::OutOfOrder { file, expected, found } => {
                write!(f, "{}: next is {} but the table continues with {}", file, found, expected)
            }
            Self::ClosedChain { file, direction, target } => {
                write!(f, "{}: {} wraps around to {}, the chain forms a cycle", file, direction, target)
            }
        }
    }
}

// ============================================================================
// Navigation injection
// ============================================================================

/// Result of running both insertion stages over one document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Injection {
    text: String,
    header: bool,
    footer: bool,
}

impl Injection {
    fn changed(&self) -> bool {
        self.header || self.footer
    }
}

struct NavigationInjector<'a> {
    index: &'a ChapterIndex,
    heading_re: Regex,
}

impl<'a> NavigationInjector<'a> {
    fn new(index: &'a ChapterIndex) -> Result<Self, regex::Error> {
        Ok(Self {
            index,
            heading_re: Regex::new(r"(?m)^# .+$")?,
        })
    }

    fn link_lines(&self, file: &str) -> Vec<String> {
        let neighbors = self.index.neighbors_of(file);
        let mut lines = Vec::new();

        if let Some(prev) = neighbors.and_then(|n| n.prev) {
            lines.push(format!("- **◀ 이전**: [{}](./{})", prev.title, prev.file));
        }
        lines.push(HOME_LINK.to_string());
        if let Some(next) = neighbors.and_then(|n| n.next) {
            lines.push(format!("- **▶ 다음**: [{}](./{})", next.title, next.file));
        }

        lines
    }

    fn header_block(&self, file: &str) -> String {
        let mut lines = vec![
            String::new(),
            "---".to_string(),
            String::new(),
            NAV_HEADING.to_string(),
            String::new(),
        ];
        lines.extend(self.link_lines(file));
        lines.push(String::new());
        lines.join("\n")
    }

    fn footer_block(&self, file: &str) -> String {
        let title = self.index.title_of(file).unwrap_or(file);
        let mut lines = vec![
            "---".to_string(),
            String::new(),
            NAV_HEADING.to_string(),
            String::new(),
        ];
        lines.extend(self.link_lines(file));
        lines.extend([
            String::new(),
            "---".to_string(),
            String::new(),
            format!("**🎉 {} 완료! 수고하셨습니다! 🚀**", title),
        ]);
        lines.join("\n")
    }

    /// Places the header block right after the first `# ` heading line.
    fn insert_header_nav(&self, text: &str, file: &str) -> String {
        if text.contains(NAV_HEADING) {
            return text.to_string();
        }
        let Some(heading) = self.heading_re.find(text) else {
            return text.to_string();
        };

        let block = self.header_block(file);
        let mut out = String::with_capacity(text.len() + block.len());
        out.push_str(&text[..heading.end()]);
        out.push_str(&block);
        out.push_str(&text[heading.end()..]);
        out
    }

    /// Appends the footer block after the summary section's closing remark.
    fn insert_footer_nav(&self, text: &str, file: &str) -> String {
        if text.contains(FOOTER_SENTINEL) {
            return text.to_string();
        }
        let Some(span) = summary_span(text) else {
            return text.to_string();
        };

        let footer = self.footer_block(file);
        let mut out = String::with_capacity(text.len() + footer.len() + 2);
        out.push_str(&text[..span.end]);
        out.push_str("\n\n");
        out.push_str(&footer);
        out.push_str(&text[span.end..]);
        out
    }

    fn inject(&self, text: &str, file: &str) -> Injection {
        // A nav heading anywhere means an earlier run already touched this document.
        if text.contains(NAV_HEADING) {
            return Injection {
                text: text.to_string(),
                header: false,
                footer: false,
            };
        }

        let with_header = self.insert_header_nav(text, file);
        let header = with_header.len() != text.len();
        let with_footer = self.insert_footer_nav(&with_header, file);
        let footer = with_footer.len() != with_header.len();

        Injection {
            text: with_footer,
            header,
            footer,
        }
    }

    #[cfg(test)]
    fn process(&self, text: &str, file: &str) -> String {
        self.inject(text, file).text
    }
}

/// Locates the summary section: from the summary heading, past the first blank line,
/// through the first "다음 챕터 ... !" remark and any whitespace after it.
fn summary_span(text: &str) -> Option<Range<usize>> {
    let start = text.find(SUMMARY_HEADING)?;
    let mut cursor = start + SUMMARY_HEADING.len();

    cursor += text[cursor..].find("\n\n")? + 2;
    cursor += text[cursor..].find(NEXT_CHAPTER_PHRASE)? + NEXT_CHAPTER_PHRASE.len();
    cursor += text[cursor..].find('!')? + 1;

    let rest = &text[cursor..];
    cursor += rest.len() - rest.trim_start().len();

    Some(start..cursor)
}

// ============================================================================
// Config
// ============================================================================

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct Config {
    dir: Option<PathBuf>,
    #[serde(default)]
    chapters: Vec<ChapterRecord>,
}

impl Config {
    fn index(&self) -> ChapterIndex {
        if self.chapters.is_empty() {
            ChapterIndex::builtin()
        } else {
            ChapterIndex::from_records(self.chapters.clone())
        }
    }

    fn resolve_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR))
    }
}

/// An explicitly named config must exist; the default one is optional.
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let (path, explicit) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG), false),
    };

    if !path.exists() {
        if explicit {
            return Err(format!("Config file not found: {}", path.display()).into());
        }
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    Ok(config)
}

// ============================================================================
// Driver
// ============================================================================

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
enum FileStatus {
    Updated { header: bool, footer: bool },
    Unchanged,
    Missing,
    Failed { error: String },
}

#[derive(Serialize, Debug, Clone)]
struct FileReport {
    file: String,
    #[serde(flatten)]
    status: FileStatus,
}

#[derive(Serialize, Debug)]
struct RunReport {
    dir: String,
    dry_run: bool,
    files: Vec<FileReport>,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }

    fn updated(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Updated { .. }))
    }

    fn missing(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Missing))
    }

    fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed { .. }))
    }
}

fn process_chapter_file(
    path: &Path,
    file: &str,
    injector: &NavigationInjector,
    dry_run: bool,
) -> Result<FileStatus, Box<dyn std::error::Error>> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("read {}: {}", path.display(), e))?;
    let injection = injector.inject(&content, file);

    if !injection.changed() {
        return Ok(FileStatus::Unchanged);
    }
    if !dry_run {
        write_chapter(path, &injection.text)?;
    }

    Ok(FileStatus::Updated {
        header: injection.header,
        footer: injection.footer,
    })
}

fn write_chapter(path: &Path, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, text).map_err(|e| format!("write {}: {}", path.display(), e))?;
    Ok(())
}

/// Processes every chapter in table order. Per-file failures are recorded, never raised.
fn run(dir: &Path, injector: &NavigationInjector, dry_run: bool) -> RunReport {
    let files = injector
        .index
        .iter()
        .map(|record| {
            let path = dir.join(&record.file);
            let status = match path.try_exists() {
                Ok(false) => FileStatus::Missing,
                Ok(true) => process_chapter_file(&path, &record.file, injector, dry_run)
                    .unwrap_or_else(|e| FileStatus::Failed { error: e.to_string() }),
                Err(e) => FileStatus::Failed {
                    error: format!("stat {}: {}", path.display(), e),
                },
            };
            FileReport {
                file: record.file.clone(),
                status,
            }
        })
        .collect();

    RunReport {
        dir: dir.display().to_string(),
        dry_run,
        files,
    }
}

fn print_file_line(report: &FileReport, dry_run: bool, quiet: bool) {
    match &report.status {
        FileStatus::Updated { header, footer } => {
            if quiet {
                return;
            }
            let mut parts = Vec::new();
            if *header {
                parts.push("header");
            }
            if *footer {
                parts.push("footer");
            }
            let verb = if dry_run { "would update" } else { "updated" };
            println!(
                "✅ {} {} {}",
                report.file,
                verb.green(),
                format!("({})", parts.join(", ")).dimmed()
            );
        }
        FileStatus::Unchanged => {
            if !quiet {
                println!("   {} {}", report.file, "unchanged".dimmed());
            }
        }
        FileStatus::Missing => {
            println!("⚠️  {} {}", "file not found:".yellow(), report.file);
        }
        FileStatus::Failed { error } => {
            println!("❌ {} {}: {}", report.file, "failed".red().bold(), error);
        }
    }
}

fn print_report(report: &RunReport, quiet: bool) {
    for file in &report.files {
        print_file_line(file, report.dry_run, quiet);
    }
}

fn cmd_apply(
    config: &Config,
    dir: Option<&Path>,
    dry_run: bool,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let dir = config.resolve_dir(dir);
    let index = config.index();
    let injector = NavigationInjector::new(&index)?;

    if !quiet && !json {
        println!("{} {}", "📚 Adding chapter navigation in".cyan().bold(), dir.display());
    }

    let report = run(&dir, &injector, dry_run);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report, quiet);

    if !quiet {
        println!();
        println!("{}", "🎉 Chapter navigation complete".green().bold());
        println!("  Chapters:      {}", index.len().to_string().cyan());
        println!("  Updated:       {}", report.updated().to_string().cyan());
        println!("  Missing:       {}", report.missing().to_string().yellow());
        println!("  Failed:        {}", report.failed().to_string().red());
        println!("  Time elapsed:  {:.2?}", start.elapsed());
    }

    Ok(())
}

fn cmd_check(
    config: &Config,
    dir: Option<&Path>,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = config.resolve_dir(dir);
    let index = config.index();
    let injector = NavigationInjector::new(&index)?;
    let issues = index.validate();
    let report = run(&dir, &injector, true);

    if json {
        let out = serde_json::json!({ "issues": &issues, "report": &report });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for issue in &issues {
            println!("{} {}", "warning:".yellow().bold(), issue);
        }
        print_report(&report, quiet);
    }

    let pending = report.updated();
    let failed = report.failed();
    if pending > 0 || failed > 0 {
        return Err(format!(
            "{} chapter(s) need navigation, {} could not be read",
            pending, failed
        )
        .into());
    }

    if !quiet && !json {
        println!("{}", "All chapters have navigation.".green());
    }
    Ok(())
}

fn cmd_list(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let index = config.index();

    if json {
        let records: Vec<&ChapterRecord> = index.iter().collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{} ({} chapters)", "Chapter Table".green().bold(), index.len());
    for (i, record) in index.iter().enumerate() {
        println!("{:>3}. {} {}", i + 1, record.file.cyan(), record.title);
        let prev = record.prev.as_deref().unwrap_or("-");
        let next = record.next.as_deref().unwrap_or("-");
        println!("     {} {}  {} {}", "◀".dimmed(), prev.dimmed(), "▶".dimmed(), next.dimmed());
    }

    Ok(())
}
