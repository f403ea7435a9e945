use tokio::io::AsyncReadExt;

use crate::{
    io::ClickhouseRead,
    values::{MultiPolygon, Point, Polygon, Ring, Value},
    Result,
};

use super::array::read_offsets;
use super::{Deserializer, DeserializerState, Type};

// Geo types are aliases: Point = Tuple(Float64, Float64), Ring = Array(Point),
// Polygon = Array(Ring), MultiPolygon = Array(Polygon). Each level repeats the
// array offset scheme over the flat point column.

async fn read_points<R: ClickhouseRead>(reader: &mut R, count: usize) -> Result<Vec<Point>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let x = f64::from_bits(reader.read_u64_le().await?);
        let y = f64::from_bits(reader.read_u64_le().await?);
        out.push(Point([x, y]));
    }
    Ok(out)
}

fn split_counts(offsets: &[u64]) -> Vec<usize> {
    let mut out = Vec::with_capacity(offsets.len());
    let mut start = 0u64;
    for &offset in offsets {
        out.push((offset - start) as usize);
        start = offset;
    }
    out
}

async fn read_rings<R: ClickhouseRead>(reader: &mut R, count: usize) -> Result<Vec<Ring>> {
    let offsets = read_offsets(reader, count).await?;
    let mut points = read_points(reader, offsets.last().copied().unwrap_or(0) as usize)
        .await?
        .into_iter();
    Ok(split_counts(&offsets)
        .into_iter()
        .map(|len| Ring(points.by_ref().take(len).collect()))
        .collect())
}

async fn read_polygons<R: ClickhouseRead>(reader: &mut R, count: usize) -> Result<Vec<Polygon>> {
    let offsets = read_offsets(reader, count).await?;
    let total = offsets.last().copied().unwrap_or(0) as usize;
    let mut rings = read_rings(reader, total).await?.into_iter();
    Ok(split_counts(&offsets)
        .into_iter()
        .map(|len| Polygon(rings.by_ref().take(len).collect()))
        .collect())
}

pub struct PointDeserializer;

impl Deserializer for PointDeserializer {
    async fn read<R: ClickhouseRead>(
        _type_: &Type,
        reader: &mut R,
        rows: usize,
        _state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        Ok(read_points(reader, rows)
            .await?
            .into_iter()
            .map(Value::Point)
            .collect())
    }
}

pub struct RingDeserializer;

impl Deserializer for RingDeserializer {
    async fn read<R: ClickhouseRead>(
        _type_: &Type,
        reader: &mut R,
        rows: usize,
        _state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        Ok(read_rings(reader, rows)
            .await?
            .into_iter()
            .map(Value::Ring)
            .collect())
    }
}

pub struct PolygonDeserializer;

impl Deserializer for PolygonDeserializer {
    async fn read<R: ClickhouseRead>(
        _type_: &Type,
        reader: &mut R,
        rows: usize,
        _state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        Ok(read_polygons(reader, rows)
            .await?
            .into_iter()
            .map(Value::Polygon)
            .collect())
    }
}

pub struct MultiPolygonDeserializer;

impl Deserializer for MultiPolygonDeserializer {
    async fn read<R: ClickhouseRead>(
        _type_: &Type,
        reader: &mut R,
        rows: usize,
        _state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        let offsets = read_offsets(reader, rows).await?;
        let total = offsets.last().copied().unwrap_or(0) as usize;
        let mut polygons = read_polygons(reader, total).await?.into_iter();
        Ok(split_counts(&offsets)
            .into_iter()
            .map(|len| Value::MultiPolygon(MultiPolygon(polygons.by_ref().take(len).collect())))
            .collect())
    }
}
