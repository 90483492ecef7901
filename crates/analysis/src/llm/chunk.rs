//! 로그 청킹 — 프로바이더 컨텍스트 제한을 지키는 분할
//!
//! 라인 경계를 보존하면서 로그 내용을 크기 제한 청크로 나눕니다.
//! 각 청크는 시작 라인 번호를 갖고 있어, 청크 상대 라인 참조를
//! 파일 절대 라인 번호로 되돌릴 수 있습니다.

/// 하나의 분석 청크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// 청크 순번 (0부터)
    pub index: usize,
    /// 파일 기준 시작 라인 번호 (1부터)
    pub start_line: u64,
    /// 청크 내용 (라인 경계 보존)
    pub content: String,
}

impl LogChunk {
    /// 청크 상대 라인 번호(1부터)를 파일 절대 라인 번호로 변환합니다.
    pub fn absolute_line(&self, relative: u64) -> u64 {
        self.start_line + relative.saturating_sub(1)
    }
}

/// 내용을 라인 경계를 보존하며 `max_bytes` 이하의 청크로 나눕니다.
///
/// 단일 라인이 `max_bytes`를 초과하면 그 라인 하나가 자체 청크가
/// 됩니다 (라인 중간에서 자르지 않습니다).
pub fn chunk_lines(content: &str, max_bytes: usize) -> Vec<LogChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_start: u64 = 1;
    let mut next_line: u64 = 1;

    for line in content.lines() {
        // +1은 라인 구분자
        let added = line.len() + 1;

        if !current.is_empty() && current.len() + added > max_bytes {
            chunks.push(LogChunk {
                index: chunks.len(),
                start_line: current_start,
                content: std::mem::take(&mut current),
            });
            current_start = next_line;
        }

        current.push_str(line);
        current.push('\n');
        next_line += 1;
    }

    if !current.is_empty() {
        chunks.push(LogChunk {
            index: chunks.len(),
            start_line: current_start,
            content: current,
        });
    }

    chunks
}
