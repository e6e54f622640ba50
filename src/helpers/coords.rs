//! Coordinate conversion through proj's `cs2cs`.

use crate::helpers::cmd::{Cmd, CommandRunner};
use anyhow::{Context, Result, bail};

/// WGS84 longitude/latitude.
pub const SRID_LATLON: u32 = 4326;

/// Spherical mercator as shipped in proj's `esri.extra` init file.
const SRID_GOOGLE: u32 = 900913;

fn init_arg(srid: u32) -> String {
    let file = if srid == SRID_GOOGLE { "esri.extra" } else { "epsg" };
    format!("+init={}:{}", file, srid)
}

/// Convert one point between spatial reference systems.
pub fn convert_point(runner: &dyn CommandRunner, from: u32, to: u32, point: (f64, f64)) -> Result<(f64, f64)> {
    if from == to {
        return Ok(point);
    }

    let input = tempfile::NamedTempFile::new()?;
    std::fs::write(input.path(), format!("{} {}", point.0, point.1))?;
    let out = runner.output(
        &Cmd::new("cs2cs")
            .arg(init_arg(from))
            .arg("+to")
            .arg(init_arg(to))
            .stdin_file(input.path()),
    )?;
    parse_cs2cs(&out)
}

/// Convert a `[minx, miny, maxx, maxy]` box corner by corner.
pub fn convert_bbox(runner: &dyn CommandRunner, from: u32, to: u32, bbox: [f64; 4]) -> Result<[f64; 4]> {
    let (minx, miny) = convert_point(runner, from, to, (bbox[0], bbox[1]))?;
    let (maxx, maxy) = convert_point(runner, from, to, (bbox[2], bbox[3]))?;
    Ok([minx, miny, maxx, maxy])
}

/// cs2cs prints `x y z` separated by whitespace.
fn parse_cs2cs(out: &str) -> Result<(f64, f64)> {
    let mut fields = out.split_whitespace();
    let (Some(x), Some(y)) = (fields.next(), fields.next()) else {
        bail!("unexpected cs2cs output: {:?}", out);
    };
    let x = x.parse().with_context(|| format!("bad x coordinate: {}", x))?;
    let y = y.parse().with_context(|| format!("bad y coordinate: {}", y))?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::cmd::SystemRunner;

    #[test]
    fn test_parse_cs2cs() {
        let (x, y) = parse_cs2cs("661231.64\t5733929.82 0.00\n").unwrap();
        assert!((x - 661231.64).abs() < 1e-6);
        assert!((y - 5733929.82).abs() < 1e-6);
        assert!(parse_cs2cs("*\n").is_err());
    }

    #[test]
    fn test_same_srid_is_identity() {
        let bbox = [5.94, 45.70, 10.54, 47.90];
        let out = convert_bbox(&SystemRunner::default(), SRID_LATLON, SRID_LATLON, bbox).unwrap();
        assert_eq!(out, bbox);
    }

    #[test]
    fn test_init_arg() {
        assert_eq!(init_arg(900913), "+init=esri.extra:900913");
        assert_eq!(init_arg(4326), "+init=epsg:4326");
    }
}
