//! シミュレートされたターゲットメモリ

use std::collections::BTreeMap;

use crate::Result;

/// アドレス空間を連続領域の集合として保持するメモリ
///
/// 実プロセスのメモリマップと同じ振る舞いになるよう、読み取りは領域の
/// 末尾で要求より短くなることがあり、領域外の開始アドレスはエラーに
/// なります。領域どうしは結合しません。
#[derive(Debug, Default)]
pub struct TargetMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl TargetMemory {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }

    /// 領域をマップする
    ///
    /// 既存の領域と重なる場合はエラーになります。
    pub fn map_region(&mut self, base: u64, data: Vec<u8>) -> Result<()> {
        let end = base + data.len() as u64;
        for (&existing_base, existing) in &self.regions {
            let existing_end = existing_base + existing.len() as u64;
            if base < existing_end && existing_base < end {
                return Err(anyhow::anyhow!(
                    "region 0x{:x}..0x{:x} overlaps mapped region 0x{:x}..0x{:x}",
                    base,
                    end,
                    existing_base,
                    existing_end
                ));
            }
        }
        self.regions.insert(base, data);
        Ok(())
    }

    /// アドレスを含む領域を探す
    fn region_containing(&self, address: u64) -> Option<(u64, &[u8])> {
        let (&base, data) = self.regions.range(..=address).next_back()?;
        if address < base + data.len() as u64 {
            Some((base, data))
        } else {
            None
        }
    }

    /// メモリを読み取る
    ///
    /// 領域の末尾にかかる読み取りは、読めた分だけを返します。開始アドレスが
    /// どの領域にも含まれない場合はエラーです。
    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        let (base, data) = self
            .region_containing(address)
            .ok_or_else(|| anyhow::anyhow!("unmapped address 0x{:x}", address))?;
        let offset = (address - base) as usize;
        let available = data.len() - offset;
        Ok(data[offset..offset + length.min(available)].to_vec())
    }

    /// メモリに書き込む
    ///
    /// 書き込み範囲の全体が1つの領域に収まっている必要があります。
    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let (base, data) = match self.region_containing(address) {
            Some((base, data)) => (base, data.len()),
            None => return Err(anyhow::anyhow!("unmapped address 0x{:x}", address)),
        };
        let offset = (address - base) as usize;
        if offset + bytes.len() > data {
            return Err(anyhow::anyhow!(
                "write of {} bytes at 0x{:x} crosses the end of the region",
                bytes.len(),
                address
            ));
        }
        if let Some(region) = self.regions.get_mut(&base) {
            region[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// リトルエンディアンの符号なし整数を読み取る（最大8バイト）
    pub fn read_unsigned(&self, address: u64, size: usize) -> Result<u64> {
        if size == 0 || size > 8 {
            return Err(anyhow::anyhow!("unsupported integer size: {} bytes", size));
        }
        let bytes = self.read(address, size)?;
        if bytes.len() < size {
            return Err(anyhow::anyhow!(
                "short read of {} bytes at 0x{:x} (expected {})",
                bytes.len(),
                address,
                size
            ));
        }
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// リトルエンディアンの符号なし整数を書き込む（最大8バイト）
    pub fn write_unsigned(&mut self, address: u64, value: u64, size: usize) -> Result<()> {
        if size == 0 || size > 8 {
            return Err(anyhow::anyhow!("unsupported integer size: {} bytes", size));
        }
        self.write(address, &value.to_le_bytes()[..size])
    }
}

impl sumire_core::MemoryReader for TargetMemory {
    fn read(&self, address: u64, length: usize) -> sumire_core::Result<Vec<u8>> {
        TargetMemory::read(self, address, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_within_region() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        assert_eq!(memory.read(0x1000, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(memory.read(0x1002, 2).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_short_read_at_region_end() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![1, 2, 3, 4]).unwrap();

        // 領域は4バイトしかないため、8バイト要求しても4バイトだけ返る
        assert_eq!(memory.read(0x1002, 8).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_read_from_unmapped_address_fails() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![1, 2, 3, 4]).unwrap();

        assert!(memory.read(0x2000, 1).is_err());
        assert!(memory.read(0xFFF, 1).is_err());
        // 領域の終端ちょうどは領域外
        assert!(memory.read(0x1004, 1).is_err());
    }

    #[test]
    fn test_adjacent_regions_do_not_merge() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![1, 2, 3, 4]).unwrap();
        memory.map_region(0x1004, vec![5, 6, 7, 8]).unwrap();

        // 読み取りは最初の領域の末尾で止まる
        assert_eq!(memory.read(0x1002, 4).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_map_region_rejects_overlap() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![0; 16]).unwrap();

        assert!(memory.map_region(0x1008, vec![0; 16]).is_err());
        assert!(memory.map_region(0xFF8, vec![0; 16]).is_err());
        assert!(memory.map_region(0x1010, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_write_and_read_back() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![0; 16]).unwrap();

        memory.write(0x1004, &[0xAA, 0xBB]).unwrap();
        assert_eq!(memory.read(0x1004, 2).unwrap(), vec![0xAA, 0xBB]);

        memory.write_unsigned(0x1008, 0x1122334455667788, 8).unwrap();
        assert_eq!(memory.read_unsigned(0x1008, 8).unwrap(), 0x1122334455667788);
        // リトルエンディアンで並ぶ
        assert_eq!(memory.read(0x1008, 2).unwrap(), vec![0x88, 0x77]);
    }

    #[test]
    fn test_write_crossing_region_end_fails() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![0; 4]).unwrap();

        assert!(memory.write(0x1002, &[1, 2, 3, 4]).is_err());
        assert!(memory.write(0x2000, &[1]).is_err());
        // 失敗した書き込みは何も変更しない
        assert_eq!(memory.read(0x1000, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_unsigned_size_bounds() {
        let mut memory = TargetMemory::new();
        memory.map_region(0x1000, vec![0; 16]).unwrap();

        assert!(memory.read_unsigned(0x1000, 0).is_err());
        assert!(memory.read_unsigned(0x1000, 9).is_err());
        assert!(memory.write_unsigned(0x1000, 1, 9).is_err());

        memory.write_unsigned(0x1000, 0x0504030201, 5).unwrap();
        assert_eq!(memory.read_unsigned(0x1000, 5).unwrap(), 0x0504030201);
    }
}
