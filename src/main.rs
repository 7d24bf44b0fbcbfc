use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

mod alphabet;
mod index;
mod io;
mod scheme;
mod search;
mod sim;

use alphabet::{Lcg, UnknownPolicy};
use index::fm::{BiFmIndex, BuildOpts, IndexMeta};
use index::rank::RankKind;
use index::store;
use scheme::expand::ExpansionMode;
use search::batch::{self, BatchOpts, BatchOutput, SearchMode};
use search::Distance;

#[derive(Parser, Debug)]
#[command(
    name = "fmsearch-rust",
    author,
    version,
    about = "Approximate search over a bidirectional FM index, driven by search schemes",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a bidirectional FM index over a reference FASTA
    Index {
        /// Reference FASTA file
        reference: String,
        /// Output prefix for index files
        #[arg(short, long, default_value = "ref")]
        output: String,
        /// Distance between sampled suffix array entries
        #[arg(long, default_value_t = 16)]
        sampling_rate: usize,
        /// Rank dictionary backend: interleaved, scan or dna4
        #[arg(long, default_value = "interleaved")]
        index_type: String,
        /// Concatenate sequences without '$' separators (admits cross-boundary hits)
        #[arg(long)]
        no_delim: bool,
        /// Append the reverse complement of every sequence to the text
        #[arg(long)]
        include_reverse: bool,
        /// Additionally write the memory-mappable fast-load format (.mmser)
        #[arg(long)]
        mmser: bool,
        /// Map characters outside ACGTN to N instead of failing
        #[arg(long)]
        ignore_unknown: bool,
        /// Replace characters outside ACGT by a random base
        #[arg(long)]
        dna4: bool,
        #[arg(short = 't', long, default_value_t = 1)]
        threads: usize,
    },
    /// Search queries against a persisted index
    Search {
        /// Path to the index file (.idx or .mmser)
        #[arg(short = 'i', long)]
        index: String,
        /// Query FASTA file
        #[arg(short = 'q', long)]
        query: String,
        /// Output path
        #[arg(short = 'o', long, default_value = "fmsearch-output.txt")]
        output: String,
        /// Number of allowed errors
        #[arg(short = 'e', long, default_value_t = 0)]
        errors: usize,
        /// Search scheme generator
        #[arg(short = 'g', long, default_value = "h2-k2")]
        generator: String,
        /// Partition expansion: uniform, bottomup or topdown
        #[arg(long, default_value = "uniform")]
        expansion_mode: String,
        /// Distance metric: ham or lev
        #[arg(long, default_value = "ham")]
        distance_metric: String,
        /// all or besthits
        #[arg(short = 'm', long, default_value = "all")]
        search_mode: String,
        /// Per-query hit cap (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        max_hits: usize,
        /// Batched descent width on error-free branches (0 = off, up to 4)
        #[arg(long, default_value_t = 0)]
        k_step: usize,
        /// Do not also search the reverse complement of each query
        #[arg(long)]
        no_reverse: bool,
        /// Only count hits per query, skip locate
        #[arg(long)]
        count_only: bool,
        /// Map characters outside ACGTN to N instead of failing
        #[arg(long)]
        ignore_unknown: bool,
        /// Replace characters outside ACGT by a random base
        #[arg(long)]
        dna4: bool,
        #[arg(short = 't', long, default_value_t = 1)]
        threads: usize,
    },
    /// Inspect search scheme generators
    Scheme {
        /// Show all generators with one line each
        #[arg(long)]
        list_generators: bool,
        /// Print the information table over every generator
        #[arg(short = 'a', long)]
        all: bool,
        #[arg(short = 'g', long, default_value = "pigeon")]
        generator: String,
        /// Assumed query length for node counts
        #[arg(short = 'l', long, default_value_t = 150)]
        length: usize,
        /// Assumed reference length for weighted node counts
        #[arg(long, default_value_t = 1_000_000_000)]
        ref_length: usize,
        #[arg(long, default_value_t = 0)]
        min_error: usize,
        #[arg(short = 'k', long, default_value_t = 2)]
        max_error: usize,
        #[arg(long, default_value_t = 4)]
        sigma: usize,
        /// uniform, bottomup or topdown
        #[arg(long, default_value = "uniform")]
        expansion_mode: String,
    },
    /// Sample reads from a reference and inject errors
    Simulate {
        /// Reference FASTA file
        reference: String,
        #[arg(short = 'n', long, default_value_t = 1000)]
        count: usize,
        #[arg(short = 'l', long, default_value_t = 100)]
        length: usize,
        #[arg(short = 'e', long, default_value_t = 0)]
        errors: usize,
        /// Inject insertions and deletions, not only substitutions
        #[arg(long)]
        indels: bool,
        #[arg(long, default_value_t = 42)]
        seed: u32,
        /// Output path (stdout if omitted)
        #[arg(short = 'o', long)]
        output: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        cmd @ Commands::Index { .. } => run_index(cmd),
        cmd @ Commands::Search { .. } => run_search(cmd),
        cmd @ Commands::Scheme { .. } => run_scheme(cmd),
        cmd @ Commands::Simulate { .. } => run_simulate(cmd),
    };
    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn unknown_policy(ignore_unknown: bool, dna4: bool) -> UnknownPolicy {
    if dna4 {
        UnknownPolicy::RandomDna4
    } else if ignore_unknown {
        UnknownPolicy::MapToN
    } else {
        UnknownPolicy::Fail
    }
}

fn run_index(cmd: Commands) -> Result<()> {
    let Commands::Index {
        reference,
        output,
        sampling_rate,
        index_type,
        no_delim,
        include_reverse,
        mmser,
        ignore_unknown,
        dna4,
        threads,
    } = cmd
    else {
        unreachable!()
    };

    let started = Instant::now();
    let records = io::fasta::read_all(Path::new(&reference))?;
    if records.is_empty() {
        bail!("reference file '{}' contains no sequences", reference);
    }

    let policy = unknown_policy(ignore_unknown, dna4);
    let mut rng = Lcg::new(0x5eed);
    let mut refs: Vec<Vec<u8>> = Vec::with_capacity(records.len());
    let mut total_len = 0usize;
    for rec in &records {
        total_len += rec.seq.len();
        let ranks = alphabet::seq_to_ranks(&rec.seq, policy, &mut rng)
            .with_context(|| format!("reference '{}'", rec.id))?;
        refs.push(ranks);
    }
    if total_len == 0 {
        bail!("reference file '{}' contains only empty sequences", reference);
    }
    let load_time = started.elapsed();

    let kind = RankKind::from_name(&index_type)?;
    println!("config:");
    println!("  reference:       {}", reference);
    println!("  sequences:       {}", records.len());
    println!("  total length:    {}", total_len);
    println!("  sampling rate:   {}", sampling_rate);
    println!("  index type:      {}", index_type);
    println!("  delimited:       {}", !no_delim);
    println!("  reverse strand:  {}", include_reverse);

    // 后缀数组排序走 rayon 全局池
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("cannot build worker pool")?;
    let build_started = Instant::now();
    let mut fm = pool.install(|| {
        BiFmIndex::build(
            &refs,
            BuildOpts {
                sampling_rate,
                kind,
                delimited: !no_delim,
                include_reverse,
            },
        )
    })?;
    fm.set_meta(IndexMeta {
        reference_file: Some(reference.clone()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });
    let build_time = build_started.elapsed();

    let save_started = Instant::now();
    let out_path = format!("{}.idx", output);
    store::save_serial(&fm, Path::new(&out_path))?;
    println!("index saved: {}", out_path);
    if mmser {
        let mm_path = format!("{}.mmser", output);
        store::save_mmser(&fm, Path::new(&mm_path))?;
        println!("index saved: {}", mm_path);
    }
    let save_time = save_started.elapsed();

    println!("stats:");
    println!("  load time:       {:>8.2}s", load_time.as_secs_f64());
    println!("  build time:      {:>8.2}s", build_time.as_secs_f64());
    println!("  save time:       {:>8.2}s", save_time.as_secs_f64());
    Ok(())
}

fn run_search(cmd: Commands) -> Result<()> {
    let Commands::Search {
        index,
        query,
        output,
        errors,
        generator,
        expansion_mode,
        distance_metric,
        search_mode,
        max_hits,
        k_step,
        no_reverse,
        count_only,
        ignore_unknown,
        dna4,
        threads,
    } = cmd
    else {
        unreachable!()
    };

    if k_step > 4 {
        bail!("k-step supports at most 4 symbols per descent (got {})", k_step);
    }

    let opts = BatchOpts {
        threads,
        errors,
        generator: generator.clone(),
        expansion: ExpansionMode::from_name(&expansion_mode)?,
        distance: Distance::from_name(&distance_metric)?,
        mode: SearchMode::from_name(&search_mode)?,
        max_hits,
        k_step,
        count_only,
    };

    println!("config:");
    println!("  query:               {}", query);
    println!("  index:               {}", index);
    println!("  generator:           {}", generator);
    println!("  expansion mode:      {}", expansion_mode);
    println!("  allowed errors:      {}", errors);
    println!("  distance metric:     {}", distance_metric);
    println!("  reverse complements: {}", !no_reverse);
    println!("  search mode:         {}", search_mode);
    println!("  max hits:            {}", max_hits);
    println!("  output path:         {}", output);

    let mut stopwatch = Instant::now();
    let policy = unknown_policy(ignore_unknown, dna4);
    let (queries, _infos) =
        io::fasta::load_rank_queries(Path::new(&query), policy, !no_reverse)?;
    if queries.is_empty() {
        bail!("query file '{}' was empty", query);
    }
    {
        let fwd = queries.len() / if no_reverse { 1 } else { 2 };
        println!("fwd queries: {}", fwd);
        println!("bwd queries: {}", queries.len() - fwd);
    }
    let load_queries_time = stopwatch.elapsed();

    stopwatch = Instant::now();
    let fm = store::load_auto(Path::new(&index))?;
    let load_index_time = stopwatch.elapsed();

    stopwatch = Instant::now();
    let result = batch::run(&fm, &queries, &opts)?;
    let search_time = stopwatch.elapsed();

    stopwatch = Instant::now();
    let mut out = std::io::BufWriter::new(
        std::fs::File::create(&output)
            .with_context(|| format!("cannot create output file '{}'", output))?,
    );
    let n_hits = match &result {
        BatchOutput::Hits(hits) => {
            for h in hits {
                writeln!(out, "{} {} {}", h.query, h.seq, h.pos)?;
            }
            hits.len()
        }
        BatchOutput::Counts(counts) => {
            for (q, c) in counts {
                writeln!(out, "{} {}", q, c)?;
            }
            counts.iter().map(|(_, c)| c).sum()
        }
    };
    out.flush()?;
    let write_time = stopwatch.elapsed();

    let total = load_queries_time + load_index_time + search_time + write_time;
    println!("stats:");
    println!("  ld queries time:     {:>8.2}s", load_queries_time.as_secs_f64());
    println!("  ld index time:       {:>8.2}s", load_index_time.as_secs_f64());
    println!("  search time:         {:>8.2}s", search_time.as_secs_f64());
    println!("  result time:         {:>8.2}s", write_time.as_secs_f64());
    println!("  total time:          {:>8.2}s", total.as_secs_f64());
    println!(
        "  queries per second:  {:>8.0}q/s",
        queries.len() as f64 / total.as_secs_f64().max(1e-9)
    );
    println!("  number of hits:      {:>8}", n_hits);
    Ok(())
}

fn scheme_parts(
    mode: ExpansionMode,
    scheme: &[scheme::Search],
    length: usize,
    sigma: usize,
    n: usize,
) -> Result<Vec<usize>> {
    mode.parts(scheme, length, sigma, n, false)
}

fn run_scheme(cmd: Commands) -> Result<()> {
    let Commands::Scheme {
        list_generators,
        all,
        generator,
        length,
        ref_length,
        min_error,
        max_error,
        sigma,
        expansion_mode,
    } = cmd
    else {
        unreachable!()
    };

    if min_error > max_error {
        bail!("min-error {} exceeds max-error {}", min_error, max_error);
    }

    if list_generators {
        for entry in scheme::generator::ALL {
            println!("{:>15} - {}", entry.name, entry.description);
        }
        return Ok(());
    }

    let mode = ExpansionMode::from_name(&expansion_mode)?;

    if all {
        println!("# Search Scheme Information");
        println!("alphabet size:    {}", sigma);
        println!("min errors:       {}", min_error);
        println!("max errors:       {}", max_error);
        println!("reference length: {}", ref_length);
        println!(
            "{:^15} | {:^5} {:^8} {:^5} {:^8} {:^7} | {:^21} | {:^21}",
            "name", "parts", "searches", "valid", "complete", "non-red", "node count ham/edit", "weighted ham/edit"
        );
        for entry in scheme::generator::ALL {
            let schemes = match (entry.generate)(min_error, max_error, sigma, ref_length) {
                Ok(s) => s,
                Err(_) => {
                    println!("{:>15} | (not available for this error budget)", entry.name);
                    continue;
                }
            };
            let parts = scheme_parts(mode, &schemes, length, sigma, ref_length)?;
            let valid = scheme::is_valid(&schemes);
            let complete = scheme::is_complete(&schemes, min_error, max_error);
            let non_red = scheme::is_non_redundant(&schemes, min_error, max_error);
            let nc_ham = scheme::node_count::node_count(&schemes, &parts, sigma, false);
            let nc_edit = scheme::node_count::node_count(&schemes, &parts, sigma, true);
            let wc_ham =
                scheme::node_count::weighted_node_count(&schemes, &parts, sigma, ref_length, false);
            let wc_edit =
                scheme::node_count::weighted_node_count(&schemes, &parts, sigma, ref_length, true);
            println!(
                "{:>15} | {:>5} {:>8} {:^5} {:^8} {:^7} | {:>10.0} {:>10.0} | {:>10.2} {:>10.2}",
                entry.name,
                schemes[0].parts(),
                schemes.len(),
                valid,
                complete,
                non_red,
                nc_ham,
                nc_edit,
                wc_ham,
                wc_edit
            );
        }
        return Ok(());
    }

    let entry = scheme::generator::get(&generator)?;
    let schemes = (entry.generate)(min_error, max_error, sigma, ref_length)?;
    let parts = scheme_parts(mode, &schemes, length, sigma, ref_length)?;

    println!("# Search Scheme Information");
    println!("name:                       {}", entry.name);
    println!("description:                {}", entry.description);
    println!("alphabet size:              {}", sigma);
    println!("min errors:                 {}", min_error);
    println!("max errors:                 {}", max_error);
    println!("reference length:           {}", ref_length);
    println!("query length:               {}", length);
    println!("number of parts:            {}", schemes[0].parts());
    println!("number of searches:         {}", schemes.len());
    println!("valid:                      {}", scheme::is_valid(&schemes));
    println!(
        "complete:                   {}",
        scheme::is_complete(&schemes, min_error, max_error)
    );
    println!(
        "non-redundant:              {}",
        scheme::is_non_redundant(&schemes, min_error, max_error)
    );
    println!(
        "node count (ham):           {:.0}",
        scheme::node_count::node_count(&schemes, &parts, sigma, false)
    );
    println!(
        "node count (edit):          {:.0}",
        scheme::node_count::node_count(&schemes, &parts, sigma, true)
    );
    println!(
        "weighted node count (ham):  {:.2}",
        scheme::node_count::weighted_node_count(&schemes, &parts, sigma, ref_length, false)
    );
    println!(
        "weighted node count (edit): {:.2}",
        scheme::node_count::weighted_node_count(&schemes, &parts, sigma, ref_length, true)
    );
    println!("part sizes ({}): {:?}", expansion_mode, parts);
    println!("searches:");
    for s in &schemes {
        println!("  pi={:?} l={:?} u={:?}", s.pi, s.l, s.u);
    }
    Ok(())
}

fn run_simulate(cmd: Commands) -> Result<()> {
    let Commands::Simulate {
        reference,
        count,
        length,
        errors,
        indels,
        seed,
        output,
    } = cmd
    else {
        unreachable!()
    };

    let records = io::fasta::read_all(Path::new(&reference))?;
    let opts = sim::SimOpts { count, length, errors, indels, seed };
    match output {
        Some(path) => {
            let mut out = std::io::BufWriter::new(
                std::fs::File::create(PathBuf::from(&path))
                    .with_context(|| format!("cannot create output file '{}'", path))?,
            );
            sim::simulate(&records, opts, &mut out)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = std::io::BufWriter::new(stdout.lock());
            sim::simulate(&records, opts, &mut out)?;
        }
    }
    Ok(())
}
