//! 子记录索引分配
//!
//! 同一记录内可能有多个同类型的文本字段，索引用于在两次提取之间稳定地区分它们。

use xxhash_rust::xxh3::xxh3_64;

use crate::subrecord::{Subrecord, SubrecordKind};

/// 特殊记录处理器
pub struct SpecialRecordHandler;

impl SpecialRecordHandler {
    pub fn requires_special_handling(record_type: &str) -> bool {
        matches!(record_type, "INFO" | "PERK" | "QUST")
    }

    /// 为记录中的文本子记录填写 `index`
    ///
    /// PERK 的 EPF2/EPFD 只在入口点类型匹配时才是文本，否则降级为不透明。
    pub fn assign_indices(record_type: &str, subrecords: &mut [Subrecord]) {
        match record_type {
            "INFO" => Self::handle_info_record(subrecords),
            "QUST" => Self::handle_qust_record(subrecords),
            _ => Self::handle_default(record_type, subrecords),
        }
    }

    /// NAM1 使用前一个 TRDT 中的 response id（偏移 12 的 u8）
    fn handle_info_record(subrecords: &mut [Subrecord]) {
        let mut response_id = 0i64;

        for subrecord in subrecords.iter_mut() {
            match &subrecord.tag {
                b"TRDT" => {
                    if let Some(&id) = subrecord.data.get(12) {
                        response_id = id as i64;
                    }
                }
                b"NAM1" => subrecord.index = Some(response_id),
                _ => {}
            }
        }
    }

    /// NNAM 使用当前 QOBJ 的目标编号；CNAM（日志条目）使用条件块与阶段的校验和
    ///
    /// 条件哈希累加自上一个 INDX 或 CNAM 之后的全部 CTDA，没有条件时只由阶段决定。
    fn handle_qust_record(subrecords: &mut [Subrecord]) {
        let mut stage_hash: i128 = 0;
        let mut entry_hash: i128 = 0;
        let mut objective_index = 0i64;

        for subrecord in subrecords.iter_mut() {
            match &subrecord.tag {
                b"INDX" => {
                    stage_hash = stable_hash(&subrecord.data);
                    entry_hash = 0;
                }
                b"CTDA" => entry_hash += stable_hash(&subrecord.data),
                b"CNAM" => {
                    subrecord.index = Some(digit_sum(entry_hash - stage_hash));
                    entry_hash = 0;
                }
                b"QOBJ" => {
                    if let Some(bytes) = subrecord.data.get(..2) {
                        objective_index = i16::from_le_bytes([bytes[0], bytes[1]]) as i64;
                    }
                }
                b"NNAM" => subrecord.index = Some(objective_index),
                _ => {}
            }
        }
    }

    /// ITXT 顺序编号；PERK 另按入口点类型处理 EPFD/EPF2
    fn handle_default(record_type: &str, subrecords: &mut [Subrecord]) {
        let is_perk = record_type == "PERK";
        let mut itxt_index = 0i64;
        let mut epfd_index = 0i64;
        let mut perk_type: Option<u8> = None;

        for i in 0..subrecords.len() {
            let tag = subrecords[i].tag;
            match &tag {
                b"ITXT" => {
                    subrecords[i].index = Some(itxt_index);
                    itxt_index += 1;
                }
                b"EPFT" if is_perk => perk_type = subrecords[i].data.first().copied(),
                b"EPFD" if is_perk => {
                    if perk_type == Some(7) && subrecords[i].is_text() {
                        subrecords[i].index = Some(epfd_index);
                        epfd_index += 1;
                    } else {
                        subrecords[i].kind = SubrecordKind::Opaque;
                    }
                }
                b"EPF2" if is_perk => {
                    if perk_type != Some(4) || !subrecords[i].is_text() {
                        subrecords[i].kind = SubrecordKind::Opaque;
                        continue;
                    }
                    match subrecords.get(i + 1) {
                        Some(next) if &next.tag == b"EPF3" => {
                            let index = le_int(next.data.get(2..).unwrap_or_default());
                            subrecords[i].index = Some(index);
                        }
                        _ => tracing::warn!("PERK 中的 EPF2 之后缺少 EPF3，索引留空"),
                    };
                }
                _ => {}
            }
        }
    }
}

/// 与进程无关的稳定哈希，取非负值
fn stable_hash(data: &[u8]) -> i128 {
    (xxh3_64(data) >> 1) as i128
}

/// 十进制各位数字之和
fn digit_sum(number: i128) -> i64 {
    let mut n = number.unsigned_abs();
    let mut sum = 0i64;
    while n > 0 {
        sum += (n % 10) as i64;
        n /= 10;
    }
    sum
}

/// 小端整数（最多 8 字节）
fn le_int(bytes: &[u8]) -> i64 {
    bytes
        .iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(tag: &[u8; 4], data: &[u8], kind: SubrecordKind) -> Subrecord {
        Subrecord::new(*tag, data.to_vec(), kind)
    }

    #[test]
    fn test_requires_special_handling() {
        assert!(SpecialRecordHandler::requires_special_handling("INFO"));
        assert!(SpecialRecordHandler::requires_special_handling("PERK"));
        assert!(SpecialRecordHandler::requires_special_handling("QUST"));
        assert!(!SpecialRecordHandler::requires_special_handling("WEAP"));
    }

    #[test]
    fn test_info_response_ids() {
        let mut trdt_1 = vec![0u8; 24];
        trdt_1[12] = 1;
        let mut trdt_2 = vec![0u8; 24];
        trdt_2[12] = 2;

        let mut subrecords = vec![
            sub(b"TRDT", &trdt_1, SubrecordKind::Trdt),
            sub(b"NAM1", b"Hello\0", SubrecordKind::Text),
            sub(b"TRDT", &trdt_2, SubrecordKind::Trdt),
            sub(b"NAM1", b"Bye\0", SubrecordKind::Text),
            sub(b"RNAM", b"Prompt\0", SubrecordKind::Text),
        ];
        SpecialRecordHandler::assign_indices("INFO", &mut subrecords);

        assert_eq!(subrecords[1].index, Some(1));
        assert_eq!(subrecords[3].index, Some(2));
        assert_eq!(subrecords[4].index, None);
    }

    #[test]
    fn test_qust_objectives_and_log_entries() {
        let mut subrecords = vec![
            sub(b"INDX", &[10, 0, 0, 0], SubrecordKind::Opaque),
            sub(b"CTDA", &[1; 32], SubrecordKind::Opaque),
            sub(b"CTDA", &[2; 32], SubrecordKind::Opaque),
            sub(b"CNAM", b"Log entry\0", SubrecordKind::Text),
            sub(b"QOBJ", &[20, 0], SubrecordKind::Qobj),
            sub(b"NNAM", b"Find the sword\0", SubrecordKind::Text),
            sub(b"QOBJ", &[30, 0], SubrecordKind::Qobj),
            sub(b"NNAM", b"Return\0", SubrecordKind::Text),
        ];
        SpecialRecordHandler::assign_indices("QUST", &mut subrecords);

        let expected = digit_sum(
            stable_hash(&[1; 32]) + stable_hash(&[2; 32]) - stable_hash(&[10, 0, 0, 0]),
        );
        assert_eq!(subrecords[3].index, Some(expected));
        assert_eq!(subrecords[5].index, Some(20));
        assert_eq!(subrecords[7].index, Some(30));
    }

    #[test]
    fn test_qust_log_entry_is_deterministic() {
        let build = || {
            vec![
                sub(b"CTDA", &[7; 32], SubrecordKind::Opaque),
                sub(b"CNAM", b"Entry\0", SubrecordKind::Text),
            ]
        };
        let mut first = build();
        let mut second = build();
        SpecialRecordHandler::assign_indices("QUST", &mut first);
        SpecialRecordHandler::assign_indices("QUST", &mut second);

        // 没有 INDX 时阶段哈希为 0
        assert_eq!(first[1].index, Some(digit_sum(stable_hash(&[7; 32]))));
        assert_eq!(first[1].index, second[1].index);
    }

    #[test]
    fn test_qust_stage_without_conditions() {
        let mut subrecords = vec![
            sub(b"INDX", &[10, 0, 0, 0], SubrecordKind::Opaque),
            sub(b"CTDA", &[3; 32], SubrecordKind::Opaque),
            sub(b"CNAM", b"I met a stranger.\0", SubrecordKind::Text),
            sub(b"INDX", &[20, 0, 0, 0], SubrecordKind::Opaque),
            sub(b"CNAM", b"The stranger left.\0", SubrecordKind::Text),
        ];
        SpecialRecordHandler::assign_indices("QUST", &mut subrecords);

        // 第二阶段不继承第一阶段的条件
        assert_eq!(subrecords[2].index, Some(76));
        assert_eq!(subrecords[4].index, Some(66));
        assert_eq!(
            subrecords[4].index,
            Some(digit_sum(-stable_hash(&[20, 0, 0, 0])))
        );
    }

    #[test]
    fn test_itxt_sequential() {
        let mut subrecords = vec![
            sub(b"ITXT", b"Yes\0", SubrecordKind::Text),
            sub(b"CTDA", &[0; 32], SubrecordKind::Opaque),
            sub(b"ITXT", b"No\0", SubrecordKind::Text),
        ];
        SpecialRecordHandler::assign_indices("MESG", &mut subrecords);

        assert_eq!(subrecords[0].index, Some(0));
        assert_eq!(subrecords[2].index, Some(1));
    }

    #[test]
    fn test_perk_entry_points() {
        let mut subrecords = vec![
            sub(b"EPFT", &[7], SubrecordKind::Epft),
            sub(b"EPFD", b"Label A\0", SubrecordKind::Text),
            sub(b"EPFD", b"Label B\0", SubrecordKind::Text),
            sub(b"EPFT", &[4], SubrecordKind::Epft),
            sub(b"EPF2", b"Activate\0", SubrecordKind::Text),
            sub(b"EPF3", &[0, 0, 5, 0], SubrecordKind::Opaque),
            sub(b"EPFT", &[1], SubrecordKind::Epft),
            sub(b"EPFD", &[0, 0, 128, 63], SubrecordKind::Text),
        ];
        SpecialRecordHandler::assign_indices("PERK", &mut subrecords);

        assert_eq!(subrecords[1].index, Some(0));
        assert_eq!(subrecords[2].index, Some(1));
        assert_eq!(subrecords[4].index, Some(5));
        assert!(subrecords[4].is_text());
        assert_eq!(subrecords[7].kind, SubrecordKind::Opaque);
    }

    #[test]
    fn test_digit_sum() {
        assert_eq!(digit_sum(0), 0);
        assert_eq!(digit_sum(12345), 15);
        assert_eq!(digit_sum(-907), 16);
    }
}
