// demos/show_results.rs — view the four filter outputs on screen.
//
// Run the main binary first to produce the PNGs, then:
//
//   cargo run --example show_results
//
// Shows each result in turn. Space/Enter advances to the next filter,
// Escape quits.

use minifb::{Key, Window, WindowOptions};

use quadfilter::program::Filter;

fn to_argb(img: &image::RgbImage) -> Vec<u32> {
    img.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (r as u32) << 16 | (g as u32) << 8 | b as u32
        })
        .collect()
}

fn main() {
    for filter in Filter::SEQUENCE {
        let path = filter.output_name();
        let img = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                eprintln!("skipping {path}: {e} (run `cargo run -- <image>` first)");
                continue;
            }
        };
        let (w, h) = (img.width() as usize, img.height() as usize);
        let buffer = to_argb(&img);

        let mut window = Window::new(
            &format!("{filter} — {path}"),
            w,
            h,
            WindowOptions::default(),
        )
        .expect("could not open window");
        window.set_target_fps(30);

        while window.is_open() {
            if window.is_key_released(Key::Escape) {
                return;
            }
            if window.is_key_released(Key::Space) || window.is_key_released(Key::Enter) {
                break;
            }
            window.update_with_buffer(&buffer, w, h).expect("window update");
        }
    }
}
