// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::env;
use std::io::Write;
use std::path::Path;

use dumpscope::Dump;
use dumpscope_image::PeImage;
use dumpscope_processor::process;

const USAGE: &str = "Usage: dumpscope_report <minidump> [image]";

fn print_report(dump_path: &Path, image_path: Option<&Path>) {
    match Dump::read_path(dump_path) {
        Ok(dump) => {
            let image = image_path.and_then(|path| match PeImage::parse_path(path) {
                Ok(image) => Some(image),
                Err(err) => {
                    let mut stderr = std::io::stderr();
                    writeln!(&mut stderr, "Error reading image: {}", err).unwrap();
                    None
                }
            });
            let report = process(&dump, image.as_ref());
            report.print(&mut std::io::stdout()).unwrap();
        }
        Err(err) => {
            let mut stderr = std::io::stderr();
            writeln!(&mut stderr, "Error reading dump: {}", err).unwrap();
        }
    }
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let mut args = env::args().skip(1);
    if let Some(dump_arg) = args.next() {
        let image_arg = args.next();
        print_report(Path::new(&dump_arg), image_arg.as_deref().map(Path::new));
    } else {
        let mut stderr = std::io::stderr();
        writeln!(&mut stderr, "{}", USAGE).unwrap();
    }
}
