//! Spatial filter values: `west,south,east,north` boxes and WKT geometries.

use crate::error::{Error, Result};
use crate::geo::{BoundingBox, Geometry};
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map},
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};

const GROUP_SEPARATOR: char = ';';

/// Parse a `pwithin` value into its OR-ed boxes.
pub fn parse_boxes(param: &str, value: &str) -> Result<Vec<BoundingBox>> {
    let boxes = value
        .split(GROUP_SEPARATOR)
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse::<BoundingBox>().map_err(|e| for_param(param, e)))
        .collect::<Result<Vec<_>>>()?;
    if boxes.is_empty() {
        return Err(Error::invalid(param, "no bounding box given"));
    }
    Ok(boxes)
}

/// Parse a `gwithin`/`gintersect` value: boxes or WKT geometries, OR-ed.
pub fn parse_shapes(param: &str, value: &str) -> Result<Vec<Geometry>> {
    let shapes = value
        .split(GROUP_SEPARATOR)
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_shape(param, v.trim()))
        .collect::<Result<Vec<_>>>()?;
    if shapes.is_empty() {
        return Err(Error::invalid(param, "no geometry given"));
    }
    Ok(shapes)
}

fn parse_shape(param: &str, value: &str) -> Result<Geometry> {
    if value.starts_with(|c: char| c.is_ascii_alphabetic()) {
        let (_, geometry) = wkt(value).map_err(|_| {
            Error::invalid(param, format!("'{}' is not a valid WKT geometry", value))
        })?;
        check_geometry(param, &geometry)?;
        Ok(geometry)
    } else {
        let bbox = value
            .parse::<BoundingBox>()
            .map_err(|e| for_param(param, e))?;
        Ok(bbox.to_polygon())
    }
}

/// Report a box parse failure against the filter parameter it came from.
fn for_param(param: &str, err: Error) -> Error {
    match err {
        Error::InvalidParameter { message, .. } => Error::invalid(param, message),
        other => other,
    }
}

fn check_geometry(param: &str, geometry: &Geometry) -> Result<()> {
    if let Geometry::Polygon { coordinates } = geometry {
        for ring in coordinates {
            if ring.len() < 4 || ring.first() != ring.last() {
                return Err(Error::invalid(param, "polygon rings must be closed with at least 4 positions"));
            }
        }
    }
    let out_of_range = match geometry.bounds() {
        Some(b) => b.west < -180.0 || b.east > 180.0 || b.south < -90.0 || b.north > 90.0,
        None => true,
    };
    if out_of_range {
        return Err(Error::invalid(param, "coordinates out of range"));
    }
    Ok(())
}

fn position(input: &str) -> IResult<&str, [f64; 2]> {
    map(
        separated_pair(
            preceded(multispace0, double),
            multispace1,
            double,
        ),
        |(lon, lat)| [lon, lat],
    )(input)
}

fn positions(input: &str) -> IResult<&str, Vec<[f64; 2]>> {
    delimited(
        preceded(multispace0, char('(')),
        separated_list1(char(','), position),
        preceded(multispace0, char(')')),
    )(input)
}

fn point(input: &str) -> IResult<&str, Geometry> {
    map(
        preceded(
            tag_no_case("POINT"),
            delimited(
                preceded(multispace0, char('(')),
                position,
                preceded(multispace0, char(')')),
            ),
        ),
        |coordinates| Geometry::Point { coordinates },
    )(input)
}

fn linestring(input: &str) -> IResult<&str, Geometry> {
    map(preceded(tag_no_case("LINESTRING"), positions), |coordinates| {
        Geometry::LineString { coordinates }
    })(input)
}

fn polygon(input: &str) -> IResult<&str, Geometry> {
    map(
        preceded(
            tag_no_case("POLYGON"),
            delimited(
                preceded(multispace0, char('(')),
                separated_list1(char(','), positions),
                preceded(multispace0, char(')')),
            ),
        ),
        |coordinates| Geometry::Polygon { coordinates },
    )(input)
}

fn wkt(input: &str) -> IResult<&str, Geometry> {
    all_consuming(delimited(
        multispace0,
        alt((point, linestring, polygon)),
        multispace0,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boxes_or_group() {
        let boxes = parse_boxes("pwithin", "-5,-5,5,5;10,10,20,20").unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1], BoundingBox::new(10.0, 10.0, 20.0, 20.0).unwrap());
    }

    #[test]
    fn test_parse_boxes_rejects_bad_ordering() {
        let err = parse_boxes("pwithin", "5,-5,-5,5").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref field, .. } if field == "pwithin"));
        assert!(parse_boxes("pwithin", "0,0,10,100").is_err());
        assert!(parse_boxes("pwithin", "").is_err());
    }

    #[test]
    fn test_parse_wkt_polygon() {
        let shapes = parse_shapes(
            "gwithin",
            "POLYGON((10 10, 20 10, 20 20, 10 20, 10 10))",
        )
        .unwrap();
        let b = shapes[0].bounds().unwrap();
        assert_eq!((b.west, b.south, b.east, b.north), (10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn test_parse_wkt_point_and_linestring() {
        assert_eq!(
            parse_shapes("gintersect", "POINT (2 3)").unwrap(),
            vec![Geometry::Point { coordinates: [2.0, 3.0] }]
        );
        let line = parse_shapes("gintersect", "LINESTRING(0 0, 5 5)").unwrap();
        assert!(matches!(line[0], Geometry::LineString { .. }));
    }

    #[test]
    fn test_parse_shape_bbox_becomes_polygon() {
        let shapes = parse_shapes("gintersect", "-10,-10,10,10").unwrap();
        assert_eq!(
            shapes[0],
            BoundingBox::new(-10.0, -10.0, 10.0, 10.0).unwrap().to_polygon()
        );
    }

    #[test]
    fn test_parse_wkt_errors() {
        for bad in [
            "POLYGON((10 10, 20 10, 20 20))",
            "POLYGON((10 10, 20 10, 20 20, 10 20, 10 11))",
            "CIRCLE(1 2)",
            "POINT(200 0)",
        ] {
            assert!(parse_shapes("gwithin", bad).is_err(), "{} should fail", bad);
        }
    }
}
