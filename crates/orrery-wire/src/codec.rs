//! Low-level field readers/writers
//!
//! All multi-byte integers are little-endian. Coordinates are written in
//! scale units (value in cm divided by the scale's unit), sign-extended on
//! read.

use orrery_core::{OrreryError, OrreryResult, Region, Scale, Space, Time};

pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Writer { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn put(&mut self, bytes: &[u8]) -> OrreryResult<()> {
        if self.pos + bytes.len() > self.buf.len() {
            return Err(OrreryError::BufferTooShort {
                expected: self.pos + bytes.len(),
                actual: self.buf.len(),
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn u8(&mut self, v: u8) -> OrreryResult<()> {
        self.put(&[v])
    }

    pub fn u32(&mut self, v: u32) -> OrreryResult<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> OrreryResult<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> OrreryResult<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn bytes(&mut self, v: &[u8]) -> OrreryResult<()> {
        self.put(v)
    }

    pub fn time(&mut self, t: Time) -> OrreryResult<()> {
        self.i64(t.as_micros())
    }

    /// One coordinate component in scale units
    fn component(&mut self, v: i32, scale: Scale) -> OrreryResult<()> {
        let units = (v / scale.unit_cm()) as i64;
        match scale.width() {
            1 => self.put(&[(units.clamp(i8::MIN as i64, i8::MAX as i64) as i8) as u8]),
            2 => self.put(&(units.clamp(i16::MIN as i64, i16::MAX as i64) as i16).to_le_bytes()),
            _ => self.put(&(units.clamp(i32::MIN as i64, i32::MAX as i64) as i32).to_le_bytes()),
        }
    }

    /// Three components plus the scale's alignment padding
    pub fn space(&mut self, s: &Space, scale: Scale) -> OrreryResult<()> {
        self.component(s.x, scale)?;
        self.component(s.y, scale)?;
        self.component(s.z, scale)?;
        for _ in 0..scale.padding() {
            self.u8(0)?;
        }
        Ok(())
    }

    /// An unsigned radius at the scale's component width
    pub fn radius(&mut self, r: u32, scale: Scale) -> OrreryResult<()> {
        let units = (r / scale.unit_cm() as u32) as u64;
        match scale.width() {
            1 => self.put(&[units.min(u8::MAX as u64) as u8]),
            2 => self.put(&(units.min(u16::MAX as u64) as u16).to_le_bytes()),
            _ => self.put(&(units.min(u32::MAX as u64) as u32).to_le_bytes()),
        }
    }

    pub fn region(&mut self, r: &Region, scale: Scale) -> OrreryResult<()> {
        self.component(r.center.x, scale)?;
        self.component(r.center.y, scale)?;
        self.component(r.center.z, scale)?;
        self.radius(r.radius, scale)?;
        self.time(r.t0)?;
        self.time(r.t1)
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> OrreryResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(OrreryError::BufferTooShort {
                expected: self.pos + n,
                actual: self.buf.len(),
            });
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn u8(&mut self) -> OrreryResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> OrreryResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> OrreryResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn i64(&mut self) -> OrreryResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn bytes(&mut self, n: usize) -> OrreryResult<&'a [u8]> {
        self.take(n)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let s = &self.buf[self.pos..];
        self.pos = self.buf.len();
        s
    }

    pub fn array<const N: usize>(&mut self) -> OrreryResult<[u8; N]> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    pub fn time(&mut self) -> OrreryResult<Time> {
        Ok(Time::from_micros(self.i64()?))
    }

    fn component(&mut self, scale: Scale) -> OrreryResult<i32> {
        let units = match scale.width() {
            1 => self.take(1)?[0] as i8 as i64,
            2 => i16::from_le_bytes(self.take(2)?.try_into().unwrap()) as i64,
            _ => i32::from_le_bytes(self.take(4)?.try_into().unwrap()) as i64,
        };
        Ok((units * scale.unit_cm() as i64) as i32)
    }

    pub fn space(&mut self, scale: Scale) -> OrreryResult<Space> {
        let x = self.component(scale)?;
        let y = self.component(scale)?;
        let z = self.component(scale)?;
        self.take(scale.padding())?;
        Ok(Space::new(x, y, z))
    }

    pub fn radius(&mut self, scale: Scale) -> OrreryResult<u32> {
        let units = match scale.width() {
            1 => self.take(1)?[0] as u64,
            2 => u16::from_le_bytes(self.take(2)?.try_into().unwrap()) as u64,
            _ => u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as u64,
        };
        Ok((units * scale.unit_cm() as u64).min(u32::MAX as u64) as u32)
    }

    pub fn region(&mut self, scale: Scale) -> OrreryResult<Region> {
        let x = self.component(scale)?;
        let y = self.component(scale)?;
        let z = self.component(scale)?;
        let radius = self.radius(scale)?;
        let t0 = self.time()?;
        let t1 = self.time()?;
        Ok(Region {
            center: Space::new(x, y, z),
            radius,
            t0,
            t1,
        })
    }
}
