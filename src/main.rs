mod compile;
mod dispatch;
mod face;
mod fitter;
mod glyph;
mod range;
mod skyline;
mod storage;
mod xml;

use clap::Parser;

fn main() {
    let args = compile::CompileArgs::parse();
    std::process::exit(if compile::run(args) { 0 } else { 1 });
}
