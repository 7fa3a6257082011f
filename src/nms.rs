// 该文件是 Shanan （山南西风） 项目的一部分。
// src/nms.rs - 非极大值抑制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::debug;

use crate::{config::SuppressionPolicy, model::Detection};

/// 计算两个 `[x, y, width, height]` 边界框的 IoU
///
/// 不相交或面积为零时返回 0，不会出现除零。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let (ax1, ay1, ax2, ay2) = (a[0], a[1], a[0] + a[2], a[1] + a[3]);
  let (bx1, by1, bx2, by2) = (b[0], b[1], b[0] + b[2], b[1] + b[3]);

  let left = ax1.max(bx1);
  let top = ay1.max(by1);
  let right = ax2.min(bx2);
  let bottom = ay2.min(by2);

  if right <= left || bottom <= top {
    return 0.0;
  }

  let intersection = (right - left) * (bottom - top);
  let area_a = (ax2 - ax1) * (ay2 - ay1);
  let area_b = (bx2 - bx1) * (by2 - by1);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心 NMS，返回保留的检测下标，按接受顺序（即分数降序）排列
///
/// 与已接受框的 IoU 严格大于阈值的候选被移除，恰好等于阈值的保留。
pub fn non_max_suppression(
  detections: &[Detection],
  iou_threshold: f32,
  policy: SuppressionPolicy,
) -> Vec<usize> {
  let mut order: Vec<usize> = (0..detections.len()).collect();
  order.sort_by(|&a, &b| detections[b].score.total_cmp(&detections[a].score));

  let mut suppressed = vec![false; detections.len()];
  let mut picked = Vec::new();

  for (pos, &current) in order.iter().enumerate() {
    if suppressed[current] {
      continue;
    }
    picked.push(current);

    for &other in &order[pos + 1..] {
      if suppressed[other] {
        continue;
      }
      if policy == SuppressionPolicy::PerClass
        && detections[other].class_idx != detections[current].class_idx
      {
        continue;
      }
      if iou(&detections[current].bbox, &detections[other].bbox) > iou_threshold {
        suppressed[other] = true;
      }
    }
  }

  debug!("NMS: {} -> {}", detections.len(), picked.len());
  picked
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(bbox: [f32; 4], class_idx: usize, score: f32) -> Detection {
    Detection {
      bbox,
      class_idx,
      score,
      mask_coefficients: Box::new([]),
    }
  }

  #[test]
  fn iou_properties() {
    let a = [0.1, 0.3, 10.7, 5.9];
    let b = [3.3, 1.1, 8.2, 9.4];
    assert_eq!(iou(&a, &b), iou(&b, &a));
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&b, &b), 1.0);
  }

  #[test]
  fn iou_degenerate() {
    let zero = [5.0, 5.0, 0.0, 0.0];
    assert_eq!(iou(&zero, &zero), 0.0);
    assert_eq!(iou(&zero, &[0.0, 0.0, 10.0, 10.0]), 0.0);
    // 仅边相接
    assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[10.0, 0.0, 10.0, 10.0]), 0.0);
    assert_eq!(iou(&[0.0, 0.0, 1.0, 1.0], &[50.0, 50.0, 1.0, 1.0]), 0.0);
  }

  #[test]
  fn keeps_highest_of_overlapping_pair() {
    let detections = vec![
      det([10.0, 10.0, 100.0, 100.0], 0, 0.6),
      det([0.0, 0.0, 100.0, 100.0], 0, 0.9),
    ];
    let overlap = iou(&detections[0].bbox, &detections[1].bbox);
    assert!((overlap - 0.6807).abs() < 1e-3);

    let keep = non_max_suppression(&detections, 0.35, SuppressionPolicy::Global);
    assert_eq!(keep, vec![1]);
  }

  #[test]
  fn tie_at_threshold_is_kept() {
    // IoU 恰好为 0.5
    let detections = vec![
      det([0.0, 0.0, 4.0, 4.0], 0, 0.9),
      det([0.0, 0.0, 4.0, 2.0], 0, 0.8),
    ];
    assert_eq!(iou(&detections[0].bbox, &detections[1].bbox), 0.5);
    let keep = non_max_suppression(&detections, 0.5, SuppressionPolicy::Global);
    assert_eq!(keep, vec![0, 1]);
  }

  #[test]
  fn global_policy_ignores_class() {
    let detections = vec![
      det([0.0, 0.0, 10.0, 10.0], 0, 0.7),
      det([0.0, 0.0, 10.0, 10.0], 5, 0.8),
    ];
    assert_eq!(
      non_max_suppression(&detections, 0.35, SuppressionPolicy::Global),
      vec![1]
    );
    assert_eq!(
      non_max_suppression(&detections, 0.35, SuppressionPolicy::PerClass),
      vec![1, 0]
    );
  }

  #[test]
  fn survivors_do_not_overlap() {
    // 线性同余生成伪随机框
    let mut seed = 12345u32;
    let mut next = || {
      seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
      (seed >> 8) as f32 / (1u32 << 24) as f32
    };

    let detections: Vec<Detection> = (0..200)
      .map(|_| {
        let bbox = [
          next() * 500.0,
          next() * 500.0,
          next() * 120.0,
          next() * 120.0,
        ];
        det(bbox, 0, next())
      })
      .collect();

    let threshold = 0.3;
    let keep = non_max_suppression(&detections, threshold, SuppressionPolicy::Global);
    assert!(!keep.is_empty());
    for (n, &i) in keep.iter().enumerate() {
      for &j in &keep[n + 1..] {
        assert!(iou(&detections[i].bbox, &detections[j].bbox) <= threshold);
      }
    }
    for pair in keep.windows(2) {
      assert!(detections[pair[0]].score >= detections[pair[1]].score);
    }
  }

  #[test]
  fn empty_input() {
    assert!(non_max_suppression(&[], 0.35, SuppressionPolicy::Global).is_empty());
  }
}
