use tokio::io::AsyncWriteExt;

use crate::{
    io::ClickhouseWrite,
    values::{Point, Polygon, Ring, Value},
    ClickhouseError, Result,
};

use super::{Serializer, SerializerState, Type};

fn bad_value(expected: &str, value: &Value) -> ClickhouseError {
    ClickhouseError::SerializeError(format!("expected {expected}, got {value:?}"))
}

async fn write_points<W: ClickhouseWrite>(writer: &mut W, points: &[Point]) -> Result<()> {
    for point in points {
        writer.write_u64_le(point.0[0].to_bits()).await?;
        writer.write_u64_le(point.0[1].to_bits()).await?;
    }
    Ok(())
}

async fn write_rings<W: ClickhouseWrite>(writer: &mut W, rings: &[&Ring]) -> Result<()> {
    let mut offset = 0u64;
    for ring in rings {
        offset += ring.0.len() as u64;
        writer.write_u64_le(offset).await?;
    }
    for ring in rings {
        write_points(writer, &ring.0).await?;
    }
    Ok(())
}

async fn write_polygons<W: ClickhouseWrite>(writer: &mut W, polygons: &[&Polygon]) -> Result<()> {
    let mut offset = 0u64;
    for polygon in polygons {
        offset += polygon.0.len() as u64;
        writer.write_u64_le(offset).await?;
    }
    let rings = polygons
        .iter()
        .flat_map(|p| p.0.iter())
        .collect::<Vec<_>>();
    write_rings(writer, &rings).await
}

pub struct PointSerializer;

impl Serializer for PointSerializer {
    async fn write<W: ClickhouseWrite>(
        _type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        _state: &mut SerializerState,
    ) -> Result<()> {
        for value in &values {
            match value {
                Value::Point(point) => write_points(writer, std::slice::from_ref(point)).await?,
                value => return Err(bad_value("Point", value)),
            }
        }
        Ok(())
    }
}

pub struct RingSerializer;

impl Serializer for RingSerializer {
    async fn write<W: ClickhouseWrite>(
        _type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        _state: &mut SerializerState,
    ) -> Result<()> {
        let mut rings = Vec::with_capacity(values.len());
        for value in &values {
            match value {
                Value::Ring(ring) => rings.push(ring),
                value => return Err(bad_value("Ring", value)),
            }
        }
        write_rings(writer, &rings).await
    }
}

pub struct PolygonSerializer;

impl Serializer for PolygonSerializer {
    async fn write<W: ClickhouseWrite>(
        _type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        _state: &mut SerializerState,
    ) -> Result<()> {
        let mut polygons = Vec::with_capacity(values.len());
        for value in &values {
            match value {
                Value::Polygon(polygon) => polygons.push(polygon),
                value => return Err(bad_value("Polygon", value)),
            }
        }
        write_polygons(writer, &polygons).await
    }
}

pub struct MultiPolygonSerializer;

impl Serializer for MultiPolygonSerializer {
    async fn write<W: ClickhouseWrite>(
        _type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        _state: &mut SerializerState,
    ) -> Result<()> {
        let mut offset = 0u64;
        for value in &values {
            match value {
                Value::MultiPolygon(multi) => {
                    offset += multi.0.len() as u64;
                    writer.write_u64_le(offset).await?;
                }
                value => return Err(bad_value("MultiPolygon", value)),
            }
        }
        let polygons = values
            .iter()
            .filter_map(|v| match v {
                Value::MultiPolygon(multi) => Some(multi.0.iter()),
                _ => None,
            })
            .flatten()
            .collect::<Vec<_>>();
        write_polygons(writer, &polygons).await
    }
}
