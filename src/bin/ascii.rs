use std::time::Instant;

use anyhow::Result;
use structopt::StructOpt;

use spinbrot::coord::{Frame, PixelMapper};
use spinbrot::painter::{AsciiPainter, Bands};
use spinbrot::score::{EscapeTime, Scorer};
use spinbrot::Engine;

#[derive(Debug, StructOpt)]
#[structopt(name = "spinbrot", about = "Render the Mandelbrot set as text")]
struct Opt {
    /// Image width in characters
    #[structopt(long, default_value = "170")]
    width: usize,

    /// Image height in lines
    #[structopt(long, default_value = "118")]
    height: usize,

    /// Worker thread count (default: one per logical CPU)
    #[structopt(short = "t", long)]
    threads: Option<usize>,

    /// Work indices claimed per batch
    #[structopt(long, default_value = "20000")]
    batch_size: usize,

    /// Escape-time iteration bound
    #[structopt(short = "i", long, default_value = "1000")]
    max_iterations: u16,

    /// Complex window as RE_MIN,RE_MAX,IM_MIN,IM_MAX
    #[structopt(long, parse(try_from_str = parse_frame))]
    frame: Option<Frame>,
}

fn parse_frame(s: &str) -> Result<Frame> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()?;
    anyhow::ensure!(parts.len() == 4, "expected RE_MIN,RE_MAX,IM_MIN,IM_MAX");
    Ok(Frame::from_nums(parts[0], parts[1], parts[2], parts[3]))
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let threads = opt.threads.unwrap_or_else(num_cpus::get);
    let scorer = EscapeTime::with_iterations(opt.max_iterations);
    let bands = Bands::classic(scorer.max_score());
    let mapper = PixelMapper::new(opt.width, opt.height, opt.frame.unwrap_or_default());

    let started = Instant::now();
    let mut engine = Engine::with_batch_size(scorer, mapper, opt.batch_size);
    engine.start(threads)?;
    engine.wait();
    let elapsed = started.elapsed();

    let painter = AsciiPainter::new(bands);
    print!("{}", painter.paint(&engine.grid())?);
    println!("Calculation took: {:.3}s to complete", elapsed.as_secs_f64());

    Ok(())
}
