use anyhow::Result;
use structopt::StructOpt;

use spinbrot::coord::{Frame, PixelMapper};
use spinbrot::painter::GreyscalePainter;
use spinbrot::score::{EscapeTime, Scorer};
use spinbrot::Engine;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "spinbrot-imagegen",
    about = "Render the Mandelbrot set to a grayscale image"
)]
struct Opt {
    /// Image width in pixels
    #[structopt(long, default_value = "2000")]
    width: usize,

    /// Image height in pixels
    #[structopt(long, default_value = "1600")]
    height: usize,

    /// Worker thread count (default: one per logical CPU)
    #[structopt(short = "t", long)]
    threads: Option<usize>,

    /// Escape-time iteration bound
    #[structopt(short = "i", long, default_value = "1000")]
    max_iterations: u16,

    /// Output file
    #[structopt(short, long, default_value = "spinbrot.png")]
    output: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let scorer = EscapeTime::with_iterations(opt.max_iterations);
    let painter = GreyscalePainter::new(scorer.max_score());
    let mapper = PixelMapper::new(opt.width, opt.height, Frame::default());

    let mut engine = Engine::new(scorer, mapper);
    engine.start(opt.threads.unwrap_or_else(num_cpus::get))?;
    engine.wait();

    let img = painter.paint(&engine.grid());
    img.save(&opt.output)?;
    Ok(())
}
